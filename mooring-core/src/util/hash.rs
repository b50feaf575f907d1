use sha2::{Digest, Sha256};

/// Incremental SHA-256 over a sequence of fields. Each field is length
/// prefixed, so `["ab", "c"]` and `["a", "bc"]` differ.
#[derive(Clone, Default)]
pub struct Fingerprint {
    hasher: Sha256,
}

impl Fingerprint {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(&mut self, field: impl AsRef<[u8]>) -> &mut Self {
        let field = field.as_ref();
        self.hasher.update((field.len() as u64).to_be_bytes());
        self.hasher.update(field);
        self
    }

    pub fn finish(self) -> String {
        hex::encode(self.hasher.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::Fingerprint;

    #[test]
    fn test_empty_fingerprint() {
        assert_eq!(
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855",
            Fingerprint::new().finish()
        );
    }

    #[test]
    fn test_fingerprint_fields_are_delimited() {
        let mut a = Fingerprint::new();
        a.field("ab").field("c");
        let mut b = Fingerprint::new();
        b.field("a").field("bc");
        let mut c = Fingerprint::new();
        c.field("ab").field("c");
        let (a, b, c) = (a.finish(), b.finish(), c.finish());
        assert_ne!(a, b);
        assert_eq!(a, c);
        assert_eq!(64, a.len());
    }
}

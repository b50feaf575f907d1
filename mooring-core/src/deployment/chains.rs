use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
};

use super::{ChainError, DeploymentUnitProcessor, Phase};
use crate::attachment::{AttachmentId, AttachmentKey};

#[derive(Clone)]
pub(crate) struct Registration {
    pub(crate) phase: Phase,
    pub(crate) priority: u32,
    pub(crate) processor: Arc<dyn DeploymentUnitProcessor>,
    // writes the processor may perform while it runs, when enforced
    pub(crate) allowed_writes: Option<Vec<AttachmentId>>,
}

/// The processors of every phase, in priority order. Built once at boot.
pub struct DeployerChains {
    phases: Vec<Vec<Registration>>,
}

impl DeployerChains {
    pub fn builder() -> DeployerChainsBuilder {
        DeployerChainsBuilder::default()
    }

    pub(crate) fn phase(&self, phase: Phase) -> &[Registration] {
        &self.phases[phase.index()]
    }

    /// `(priority, processor name)` pairs of one phase, in execution order.
    pub fn processors(&self, phase: Phase) -> Vec<(u32, &'static str)> {
        self.phase(phase)
            .iter()
            .map(|r| (r.priority, r.processor.name()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.phases.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Default)]
pub struct DeployerChainsBuilder {
    registrations: BTreeMap<(Phase, u32), Arc<dyn DeploymentUnitProcessor>>,
    provided: BTreeSet<AttachmentId>,
}

impl DeployerChainsBuilder {
    /// Register `processor` at `(phase, priority)`. Each slot takes one processor.
    pub fn add(
        &mut self,
        phase: Phase,
        priority: u32,
        processor: impl DeploymentUnitProcessor + 'static,
    ) -> Result<&mut Self, ChainError> {
        self.add_shared(phase, priority, Arc::new(processor))
    }

    pub fn add_shared(
        &mut self,
        phase: Phase,
        priority: u32,
        processor: Arc<dyn DeploymentUnitProcessor>,
    ) -> Result<&mut Self, ChainError> {
        if let Some(existing) = self.registrations.get(&(phase, priority)) {
            return Err(ChainError::DuplicatePriority {
                phase,
                priority,
                existing: existing.name(),
                added: processor.name(),
            });
        }
        self.registrations.insert((phase, priority), processor);
        Ok(self)
    }

    /// Declare an attachment supplied with the initial attachments of every
    /// deployment.
    pub fn provide<T: 'static>(&mut self, key: &AttachmentKey<T>) -> &mut Self {
        self.provided.insert(key.id());
        self
    }

    /// Check every declared read against the writes registered before it.
    pub fn build(self) -> Result<DeployerChains, ChainError> {
        let mut written = self.provided;
        let mut phases = vec![Vec::new(); Phase::ALL.len()];
        for ((phase, priority), processor) in self.registrations {
            let contract = processor.contract();
            if let Some(contract) = &contract {
                if let Some(missing) = contract.reads.iter().find(|r| !written.contains(r)) {
                    return Err(ChainError::UnsatisfiedInput {
                        processor: processor.name(),
                        phase,
                        priority,
                        input: missing.to_string(),
                    });
                }
                written.extend(contract.writes.iter().copied());
            }
            let allowed_writes = contract
                .filter(|c| c.enforced)
                .map(|c| c.writes);
            phases[phase.index()].push(Registration {
                phase,
                priority,
                processor,
                allowed_writes,
            });
        }
        Ok(DeployerChains { phases })
    }
}

#[cfg(test)]
mod tests {
    use super::DeployerChains;
    use crate::{
        attachment::AttachmentKey,
        deployment::{
            AttachmentContract, ChainError, DeploymentPhaseContext, DeploymentUnitProcessingError,
            DeploymentUnitProcessor, Phase,
        },
    };

    const INDEX: AttachmentKey<Vec<String>> = AttachmentKey::new("index");

    struct Producer;
    struct Consumer;

    impl DeploymentUnitProcessor for Producer {
        fn deploy(&self, _: &mut DeploymentPhaseContext<'_>) -> Result<(), DeploymentUnitProcessingError> {
            Ok(())
        }

        fn contract(&self) -> Option<AttachmentContract> {
            Some(AttachmentContract::new().writes(&INDEX))
        }
    }

    impl DeploymentUnitProcessor for Consumer {
        fn deploy(&self, _: &mut DeploymentPhaseContext<'_>) -> Result<(), DeploymentUnitProcessingError> {
            Ok(())
        }

        fn contract(&self) -> Option<AttachmentContract> {
            Some(AttachmentContract::new().reads(&INDEX))
        }
    }

    #[test]
    fn test_duplicate_priority_rejected() {
        let mut builder = DeployerChains::builder();
        builder.add(Phase::Parse, 0x10, Producer).unwrap();
        assert!(matches!(
            builder.add(Phase::Parse, 0x10, Consumer),
            Err(ChainError::DuplicatePriority { existing: "Producer", added: "Consumer", .. })
        ));
    }

    #[test]
    fn test_reads_need_earlier_writes() {
        let mut builder = DeployerChains::builder();
        builder.add(Phase::Structure, 0x10, Consumer).unwrap();
        builder.add(Phase::Parse, 0x10, Producer).unwrap();
        assert!(matches!(
            builder.build(),
            Err(ChainError::UnsatisfiedInput { processor: "Consumer", .. })
        ));

        let mut builder = DeployerChains::builder();
        builder
            .add(Phase::Structure, 0x10, Producer)
            .unwrap()
            .add(Phase::Parse, 0x10, Consumer)
            .unwrap();
        let chains = builder.build().unwrap();
        assert_eq!(vec![(0x10, "Consumer")], chains.processors(Phase::Parse));
        assert_eq!(2, chains.len());

        let mut builder = DeployerChains::builder();
        builder.provide(&INDEX);
        builder.add(Phase::Structure, 0x10, Consumer).unwrap();
        assert!(builder.build().is_ok());
    }
}

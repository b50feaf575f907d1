use mooring_services::appclient::AppClientParams;
use service_async::Param;

use super::Config;

impl Param<AppClientParams> for Config {
    fn param(&self) -> AppClientParams {
        AppClientParams {
            deployment: self.appclient.deployment.clone(),
            args: self.appclient.args.clone(),
        }
    }
}

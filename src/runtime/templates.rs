use crate::models::version::CompatibilityTier;

pub(crate) const RUN_SCRIPT_NAME: &str = "mlrun.sh";
pub(crate) const DOWNLOAD_SCRIPT_NAME: &str = "mldownload.sh";

pub(crate) const RUN_SCRIPT: &str = include_str!("templates/mlrun.sh");
pub(crate) const DOWNLOAD_SCRIPT: &str = include_str!("templates/mldownload.sh");
pub(crate) const PRODUCT_DOCKERFILE: &str = include_str!("templates/product.Dockerfile");

const CENTOS6_DOCKERFILE: &str = include_str!("templates/centos6.Dockerfile");
const CENTOS7_DOCKERFILE: &str = include_str!("templates/centos7.Dockerfile");
const ROCKY8_DOCKERFILE: &str = include_str!("templates/rocky8.Dockerfile");

pub(crate) fn os_dockerfile(tier: CompatibilityTier) -> &'static str {
    match tier {
        CompatibilityTier::Centos6 => CENTOS6_DOCKERFILE,
        CompatibilityTier::Centos7 => CENTOS7_DOCKERFILE,
        CompatibilityTier::Rocky8 => ROCKY8_DOCKERFILE,
    }
}

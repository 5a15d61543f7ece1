pub use integrity_policy_controller_core as core;
pub use integrity_policy_controller_k8s_api as k8s;
pub use integrity_policy_controller_k8s_index as index;

mod admission;
mod args;
mod metrics;
mod mode;

pub use self::{admission::Admission, args::Args, metrics::AdmissionMetrics, mode::Mode};

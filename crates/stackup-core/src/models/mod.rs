pub mod config;
pub mod descriptor;
pub mod process;
pub mod state;

pub use config::DeploymentConfig;
pub use descriptor::{
    DatabaseSpec, EndpointUrls, IdentitySpec, ProcessSpec, ReadinessCheck, SectionInsert,
    ServiceDescriptor, ServicePaths, SourceComponent, TemplateSpec,
};
pub use process::{ProcessStatus, SupervisedProcess};
pub use state::{ProvisioningState, Stage};

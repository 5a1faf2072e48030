pub mod events;
pub mod handle;
pub mod orchestrator;
pub mod probe;
pub mod provisioner;

#[cfg(test)]
pub(crate) mod testing;

pub use events::{event_channel, EventReceiver, EventSender, PipelineEvent};
pub use handle::{DetectorHandle, ProvisionedHandle, SummarizerHandle, TranslatorHandle};
pub use orchestrator::Orchestrator;
pub use probe::CapabilityProbe;
pub use provisioner::CapabilityProvisioner;

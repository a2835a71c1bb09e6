//! Liveness of the host itself

use super::check::{HealthProbe, Options, ProbeCheck};
use super::host::{HostAware, HostContext, HostSlot};
use super::result::ResultBuilder;
use crate::error::Result;
use std::sync::Arc;

pub const CONTEXT_GROUP: &str = "runtime";
pub const CONTEXT_ID: &str = "context";

#[derive(Default)]
pub struct ContextProbe {
    host: HostSlot,
}

impl HealthProbe for ContextProbe {
    fn probe(&self, builder: &mut ResultBuilder, _options: &Options) -> Result<()> {
        builder.unknown();

        if let Some(host) = self.host.get() {
            let status = host.status();
            builder
                .detail("context.name", host.name())
                .detail("context.status", status.name());

            if status.is_started() {
                builder.up();
            } else if status.is_stopped() {
                builder
                    .down()
                    .message(format!("Context {} has status {}", host.name(), status));
            }
        }

        Ok(())
    }

    fn as_host_aware(&self) -> Option<&dyn HostAware> {
        Some(self)
    }
}

impl HostAware for ContextProbe {
    fn set_host(&self, host: Arc<dyn HostContext>) {
        self.host.set(host);
    }

    fn host(&self) -> Option<Arc<dyn HostContext>> {
        self.host.get()
    }
}

pub type ContextHealthCheck = ProbeCheck<ContextProbe>;

impl ProbeCheck<ContextProbe> {
    pub fn for_context() -> Self {
        ProbeCheck::new(CONTEXT_ID, ContextProbe::default()).with_group(CONTEXT_GROUP)
    }
}

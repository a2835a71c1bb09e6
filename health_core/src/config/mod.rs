pub mod settings;

pub use settings::{AgentSettings, CheckOverrides, HealthSettings, RouteSettings};

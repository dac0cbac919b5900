pub mod combine;
pub mod input;
pub mod output;
pub mod pattern;
pub mod remote;

pub use combine::combine;
pub use input::InputSafetyGate;
pub use output::{OutputGateConfig, OutputSafetyGate};
pub use pattern::PatternClassifier;
pub use remote::RemoteSafetyClassifier;

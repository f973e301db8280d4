pub mod grid;
pub mod permutation;
pub mod record;
pub mod settings;
pub mod stage;
pub mod stimulus;
pub mod trial;

pub use grid::{StimulusGrid, extent, grid};
pub use permutation::{PermutationError, Shuffled, seeded_fraction, shuffle, unshuffle};
pub use record::{MaskerInfo, ResultRecord};
pub use settings::TestSettings;
pub use stage::SessionStage;
pub use stimulus::{DomainKind, NoiseColor, RaiseShape, SignalKind, TestKind};
pub use trial::{Playback, TrialState};

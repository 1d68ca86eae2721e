/// The stage of the pipeline a status message refers to
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Stage {
    #[default]
    Loading,
    Velocity,
    Msd,
    Plotting,
    Aggregating,
    Finished,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::Loading => "Loading",
            Stage::Velocity => "Velocity",
            Stage::Msd => "MSD",
            Stage::Plotting => "Plotting",
            Stage::Aggregating => "Aggregating",
            Stage::Finished => "Finished",
        };
        write!(f, "{name}")
    }
}

/// Progress message sent from the processor to whoever is watching (typically the CLI)
#[derive(Debug, Clone, Default)]
pub struct SampleStatus {
    /// fraction of all samples completed
    pub progress: f32,
    pub sample_index: usize,
    pub sample_name: String,
    pub stage: Stage,
}

impl SampleStatus {
    pub fn new(progress: f32, sample_index: usize, sample_name: &str, stage: Stage) -> Self {
        Self {
            progress,
            sample_index,
            sample_name: sample_name.to_string(),
            stage,
        }
    }
}

/// Run-config-search min/max bounds used as a fallback range for any
/// parameter the user didn't pin to an explicit list. Defaults are taken
/// verbatim from the upstream profile-command defaults.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunConfigSearchBounds {
    pub min_concurrency: u32,
    pub max_concurrency: u32,
    pub min_request_rate: u32,
    pub max_request_rate: u32,
    pub min_instance_count: u32,
    pub max_instance_count: u32,
    pub min_model_batch_size: u32,
    pub max_model_batch_size: u32,
}

impl Default for RunConfigSearchBounds {
    fn default() -> Self {
        RunConfigSearchBounds {
            min_concurrency: 1,
            max_concurrency: 1024,
            min_request_rate: 16,
            max_request_rate: 8192,
            min_instance_count: 1,
            max_instance_count: 5,
            min_model_batch_size: 1,
            max_model_batch_size: 128,
        }
    }
}

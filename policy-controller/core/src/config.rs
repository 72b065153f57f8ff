/// Settings that shape compiled output.
///
/// Passed explicitly into [`crate::compile`] so that compilation never consults process state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    /// Whether the proxy filter rejects requests when the limiter service can't be reached.
    pub failure_mode_deny: bool,

    /// The name of the limiter service as known to the proxy.
    pub service: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            failure_mode_deny: true,
            service: Self::DEFAULT_SERVICE.to_string(),
        }
    }
}

impl Config {
    pub const DEFAULT_SERVICE: &'static str = "ratelimit-service";
}

use thiserror::Error;

/// What the agent does for this run. Chosen once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    /// Connect, then prepare data, build, train and evaluate the model.
    Train,
    /// Load the model and classify the local test set. No network.
    Classify,
    /// Connect, load the model and serve HTTP inference until terminated.
    Server,
    /// Classify the local test set through a running inference server.
    ClassifyHttp,
}

impl Mode {
    pub const ALL: [Mode; 4] = [Mode::Train, Mode::Classify, Mode::Server, Mode::ClassifyHttp];

    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Train => "train",
            Mode::Classify => "classify",
            Mode::Server => "server",
            Mode::ClassifyHttp => "classify_http",
        }
    }

    /// Validate the command-line token against the configured mode set.
    ///
    /// A mode must be both configured and known; anything else is rejected
    /// before any model or network work begins.
    pub fn select(arg: Option<&str>, allowed: &[String]) -> Result<Mode, UsageError> {
        let arg = arg.ok_or(UsageError::MissingArgument)?;
        if !allowed.iter().any(|m| m == arg) {
            return Err(UsageError::Unsupported(arg.to_string()));
        }
        arg.parse()
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Mode {
    type Err = UsageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Mode::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| UsageError::Unsupported(s.to_string()))
    }
}

/// Problems with the command line, reported before any side effect.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UsageError {
    #[error("You must provide an argument")]
    MissingArgument,

    #[error("Mode not supported! server, train or inference")]
    Unsupported(String),
}

impl UsageError {
    pub fn exit_code(&self) -> i32 {
        2
    }
}

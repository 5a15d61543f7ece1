use anyhow::{anyhow, Error, Result};

/// Controls whether policy denials are enforced.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum Mode {
    /// Denials are returned to the API server.
    #[default]
    Enforce,

    /// Denials are logged and counted, but every evaluated request is admitted.
    Detect,
}

// === impl Mode ===

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Enforce => "enforce",
            Self::Detect => "detect",
        }
    }
}

impl std::str::FromStr for Mode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "enforce" => Ok(Self::Enforce),
            "detect" => Ok(Self::Detect),
            s => Err(anyhow!("invalid mode: {:?}", s)),
        }
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.as_str().fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_modes() {
        assert_eq!("enforce".parse::<Mode>().unwrap(), Mode::Enforce);
        assert_eq!("detect".parse::<Mode>().unwrap(), Mode::Detect);
        assert_eq!(Mode::default(), Mode::Enforce);
        assert_eq!(Mode::Detect.to_string(), "detect");

        let err = "audit".parse::<Mode>().unwrap_err();
        assert_eq!(err.to_string(), "invalid mode: \"audit\"");
    }
}

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Terminator appended to messages sent to the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineEnding {
    None,
    #[default]
    Lf,
    Cr,
    CrLf,
}

impl LineEnding {
    pub fn as_str(&self) -> &'static str {
        match self {
            LineEnding::None => "",
            LineEnding::Lf => "\n",
            LineEnding::Cr => "\r",
            LineEnding::CrLf => "\r\n",
        }
    }

    pub fn terminate(&self, message: &str) -> String {
        format!("{}{}", message, self.as_str())
    }
}

impl FromStr for LineEnding {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" | "" => Ok(LineEnding::None),
            "lf" | "nl" => Ok(LineEnding::Lf),
            "cr" => Ok(LineEnding::Cr),
            "crlf" | "both" => Ok(LineEnding::CrLf),
            other => Err(format!("unknown line ending '{}'", other)),
        }
    }
}

impl std::fmt::Display for LineEnding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            LineEnding::None => "none",
            LineEnding::Lf => "lf",
            LineEnding::Cr => "cr",
            LineEnding::CrLf => "crlf",
        };
        write!(f, "{}", name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminates_messages() {
        assert_eq!(LineEnding::None.terminate("on"), "on");
        assert_eq!(LineEnding::CrLf.terminate("on"), "on\r\n");
    }

    #[test]
    fn names_parse_back() {
        for ending in [LineEnding::None, LineEnding::Lf, LineEnding::Cr, LineEnding::CrLf] {
            assert_eq!(ending.to_string().parse::<LineEnding>(), Ok(ending));
        }
        assert!("tab".parse::<LineEnding>().is_err());
    }
}

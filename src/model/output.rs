use serde::{Serialize, Deserialize};
use std::fmt;
use std::str::FromStr;

/// Which discriminator output a forward pass returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutputSelect {
    /// Per-class scores from the linear decision head (a single score for a
    /// real/fake discriminator).
    #[default]
    Logits,
    /// Flattened feature map feeding the heads.
    Penultimate,
    Projection1,
    Projection2,
}

impl OutputSelect {
    pub const ALL: [OutputSelect; 4] = [
        OutputSelect::Logits,
        OutputSelect::Penultimate,
        OutputSelect::Projection1,
        OutputSelect::Projection2,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            OutputSelect::Logits => "logits",
            OutputSelect::Penultimate => "penultimate",
            OutputSelect::Projection1 => "projection1",
            OutputSelect::Projection2 => "projection2",
        }
    }
}

impl fmt::Display for OutputSelect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for OutputSelect {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OutputSelect::ALL
            .into_iter()
            .find(|sel| sel.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                format!(
                    "unknown output '{}', expected one of: logits, penultimate, projection1, projection2",
                    s
                )
            })
    }
}

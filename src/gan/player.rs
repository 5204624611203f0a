use std::fmt;

/// One of the two competing models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
pub enum Player {
    Generator,
    Discriminator,
}

impl Player {
    /// Get player name for display
    pub fn name(self) -> &'static str {
        match self {
            Player::Generator => "generator",
            Player::Discriminator => "discriminator",
        }
    }
}

impl fmt::Display for Player {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

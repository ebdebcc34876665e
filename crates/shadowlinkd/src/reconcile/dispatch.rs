//! Ordered mapping from desired-state tokens to actuator effects.

use std::fmt;

/// Colour driven on the status light.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LightColour {
    /// Red.
    Red,
    /// Blue.
    Blue,
    /// Green.
    Green,
}

impl LightColour {
    /// Argument passed to the light-control program.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Red => "red",
            Self::Blue => "blue",
            Self::Green => "green",
        }
    }
}

impl fmt::Display for LightColour {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One side effect applied by the actuator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Effect {
    /// Set the status light.
    Light(LightColour),
    /// Switch the heater.
    Heater(bool),
    /// Switch the fan.
    Fan(bool),
    /// Set the displayed target temperature window.
    TargetWindow {
        /// Upper bound.
        upper: i32,
        /// Lower bound.
        lower: i32,
    },
}

/// Label published as telemetry for numeric tokens.
pub const TEMPERATURE_LABEL: &str = "temperature";

const TEMPERATURE_SPREAD: i32 = 20;

struct DispatchEntry {
    token: &'static str,
    effects: &'static [Effect],
}

// Checked top to bottom before the numeric fallback.
const DISPATCH_TABLE: &[DispatchEntry] = &[
    DispatchEntry {
        token: "red+f",
        effects: &[
            Effect::Light(LightColour::Red),
            Effect::Heater(false),
            Effect::Fan(true),
        ],
    },
    DispatchEntry {
        token: "red",
        effects: &[Effect::Light(LightColour::Red)],
    },
    DispatchEntry {
        token: "blue",
        effects: &[Effect::Light(LightColour::Blue)],
    },
    DispatchEntry {
        token: "blue+h",
        effects: &[
            Effect::Light(LightColour::Blue),
            Effect::Heater(true),
            Effect::Fan(false),
        ],
    },
    DispatchEntry {
        token: "green",
        effects: &[Effect::Light(LightColour::Green)],
    },
    DispatchEntry {
        token: "on",
        effects: &[Effect::Heater(true), Effect::Fan(false)],
    },
    DispatchEntry {
        token: "off",
        effects: &[Effect::Heater(false), Effect::Fan(true)],
    },
];

/// Effects to apply for one desired token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actuation {
    token: String,
    label: String,
    effects: Vec<Effect>,
}

impl Actuation {
    /// Desired token that produced this actuation.
    #[must_use]
    pub fn token(&self) -> &str {
        self.token.as_str()
    }

    /// Label published as telemetry.
    #[must_use]
    pub fn label(&self) -> &str {
        self.label.as_str()
    }

    /// Effects in application order.
    #[must_use]
    pub fn effects(&self) -> &[Effect] {
        &self.effects
    }
}

/// Result of resolving a desired token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenOutcome {
    /// The token maps to an actuation.
    Known(Actuation),
    /// The token is neither enumerated nor an integer.
    Invalid {
        /// Offending token.
        token: String,
    },
}

/// Resolves `token` against the table, falling back to an integer target
/// temperature.
#[must_use]
pub fn resolve(token: &str) -> TokenOutcome {
    if let Some(entry) = DISPATCH_TABLE.iter().find(|entry| entry.token == token) {
        return TokenOutcome::Known(Actuation {
            token: token.to_owned(),
            label: entry.token.to_owned(),
            effects: entry.effects.to_vec(),
        });
    }

    let window = token.trim().parse::<i32>().ok().and_then(|target| {
        Some(Effect::TargetWindow {
            upper: target.checked_add(TEMPERATURE_SPREAD)?,
            lower: target.checked_sub(TEMPERATURE_SPREAD)?,
        })
    });
    match window {
        Some(effect) => TokenOutcome::Known(Actuation {
            token: token.to_owned(),
            label: TEMPERATURE_LABEL.to_owned(),
            effects: vec![effect],
        }),
        None => TokenOutcome::Invalid {
            token: token.to_owned(),
        },
    }
}

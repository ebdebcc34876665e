//! Physical actuation through external control programs.

use std::fmt;
use std::io;
use std::process::Command;

use shadowlink_config::Config;
use thiserror::Error;
use tracing::debug;

use crate::reconcile::{Actuation, Effect};

const ACTUATOR_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::actuator");

/// Applies resolved actuations to the device.
pub trait Actuator {
    /// Applies every effect of `actuation`.
    fn apply(&self, actuation: &Actuation) -> Result<(), ActuatorError>;
}

/// Errors raised while driving the control programs.
#[derive(Debug, Error)]
pub enum ActuatorError {
    /// The program could not be started.
    #[error("failed to run '{command}': {source}")]
    Spawn {
        /// Command line that failed to start.
        command: String,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The program exited unsuccessfully.
    #[error("'{command}' exited with {}", describe_exit(.code))]
    Failed {
        /// Command line that failed.
        command: String,
        /// Exit code, absent when terminated by a signal.
        code: Option<i32>,
    },
}

fn describe_exit(code: &Option<i32>) -> String {
    code.map_or_else(|| String::from("a signal"), |code| format!("status {code}"))
}

/// One control program invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActuatorCommand {
    program: String,
    args: Vec<String>,
}

impl ActuatorCommand {
    fn new(program: &str, args: impl IntoIterator<Item = String>) -> Self {
        Self {
            program: program.to_owned(),
            args: args.into_iter().collect(),
        }
    }

    /// Program name or path.
    #[must_use]
    pub fn program(&self) -> &str {
        self.program.as_str()
    }

    /// Program arguments.
    #[must_use]
    pub fn args(&self) -> &[String] {
        &self.args
    }

    fn run(&self) -> Result<(), ActuatorError> {
        debug!(target: ACTUATOR_TARGET, command = %self, "running actuator command");
        let status = Command::new(&self.program)
            .args(&self.args)
            .status()
            .map_err(|source| ActuatorError::Spawn {
                command: self.to_string(),
                source,
            })?;
        if status.success() {
            Ok(())
        } else {
            Err(ActuatorError::Failed {
                command: self.to_string(),
                code: status.code(),
            })
        }
    }
}

impl fmt::Display for ActuatorCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Runs the light-control and climate-control programs.
///
/// Every effect is attempted even when an earlier one fails; the first
/// failure is returned.
#[derive(Debug, Clone)]
pub struct CommandActuator {
    light_command: String,
    climate_command: String,
}

impl CommandActuator {
    /// Builds an actuator from explicit program names.
    #[must_use]
    pub fn new(light_command: impl Into<String>, climate_command: impl Into<String>) -> Self {
        Self {
            light_command: light_command.into(),
            climate_command: climate_command.into(),
        }
    }

    /// Builds an actuator from the configured program names.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.light_command.clone(), config.climate_command.clone())
    }

    /// Command line realising `effect`.
    #[must_use]
    pub fn command_for(&self, effect: Effect) -> ActuatorCommand {
        let switch = |on: bool| String::from(if on { "1" } else { "0" });
        match effect {
            Effect::Light(colour) => {
                ActuatorCommand::new(&self.light_command, [colour.as_str().to_owned()])
            }
            Effect::Heater(on) => {
                ActuatorCommand::new(&self.climate_command, [String::from("-h"), switch(on)])
            }
            Effect::Fan(on) => {
                ActuatorCommand::new(&self.climate_command, [String::from("-c"), switch(on)])
            }
            Effect::TargetWindow { upper, lower } => ActuatorCommand::new(
                &self.climate_command,
                [String::from("-w"), format!("{upper}:{lower}")],
            ),
        }
    }
}

impl Actuator for CommandActuator {
    fn apply(&self, actuation: &Actuation) -> Result<(), ActuatorError> {
        let mut first_failure = None;
        for effect in actuation.effects() {
            if let Err(error) = self.command_for(*effect).run() {
                first_failure.get_or_insert(error);
            }
        }
        first_failure.map_or(Ok(()), Err)
    }
}

//! Operator command registration.
//!
//! The host exposes a chat/console command surface; modules use it to
//! offer toggles (the module overview window is the one built-in user).
//! Callback faults are logged and contained, never propagated into the
//! host's command processing.

use std::collections::BTreeMap;

use tracing::error;

use crate::error::{Error, Result};

type Callback = Box<dyn FnMut(&str) -> anyhow::Result<()> + Send>;

struct Command {
    help: String,
    callback: Callback,
}

#[derive(Default)]
pub struct CommandRegistry {
    commands: BTreeMap<String, Command>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a command. Names are unique; a second registration under
    /// the same name is rejected.
    pub fn register(
        &mut self,
        name: &str,
        help: &str,
        callback: impl FnMut(&str) -> anyhow::Result<()> + Send + 'static,
    ) -> Result<()> {
        if self.commands.contains_key(name) {
            return Err(Error::CommandExists(name.to_string()));
        }

        self.commands.insert(
            name.to_string(),
            Command {
                help: help.to_string(),
                callback: Box::new(callback),
            },
        );
        Ok(())
    }

    pub fn unregister(&mut self, name: &str) -> bool {
        self.commands.remove(name).is_some()
    }

    /// Invoke a command by name. Returns false when no such command is
    /// registered; a fault inside the callback is logged and swallowed.
    pub fn invoke(&mut self, name: &str, args: &str) -> bool {
        let Some(command) = self.commands.get_mut(name) else {
            return false;
        };

        if let Err(e) = (command.callback)(args) {
            error!("Command '{}' failed: {:#}", name, e);
        }
        true
    }

    /// Registered commands with their help text, for help output.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.commands
            .iter()
            .map(|(name, cmd)| (name.as_str(), cmd.help.as_str()))
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

use crate::cmd::{cmd, Cmd};
use crate::types::ToRedisArgs;

/// Represents a redis command pipeline: several commands sent back-to-back
/// in one write, answered by one reply per command.
///
/// A pipeline is submitted to the session as a single batch, so its replies
/// are delivered together and in sub-command order even when other callers
/// are multiplexed onto the same connection.
#[derive(Clone, Default)]
pub struct Pipeline {
    commands: Vec<Cmd>,
}

/// Shortcut for creating a new pipeline.
pub fn pipe() -> Pipeline {
    Pipeline::new()
}

impl Pipeline {
    /// Creates an empty pipeline.
    pub fn new() -> Pipeline {
        Pipeline::default()
    }

    /// Starts a new command in the pipeline and returns it for argument
    /// chaining.
    ///
    /// ```rust
    /// let mut p = redis_mux::pipe();
    /// p.cmd("SET").arg("k").arg("v");
    /// p.cmd("GET").arg("k");
    /// ```
    pub fn cmd(&mut self, name: &str) -> &mut Cmd {
        self.commands.push(cmd(name));
        let last = self.commands.len() - 1;
        &mut self.commands[last]
    }

    /// Adds an already built command to the pipeline.
    pub fn add_command(&mut self, cmd: Cmd) -> &mut Pipeline {
        self.commands.push(cmd);
        self
    }

    /// Appends an argument to the last command started with
    /// [`cmd`](Self::cmd).
    pub fn arg<T: ToRedisArgs>(&mut self, arg: T) -> &mut Pipeline {
        if let Some(last) = self.commands.last_mut() {
            last.arg(arg);
        }
        self
    }

    /// Number of commands in the pipeline; one reply arrives per command.
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Returns true when the pipeline holds no commands.
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Removes all commands so the pipeline can be reused.
    pub fn clear(&mut self) {
        self.commands.clear();
    }

    /// Returns the packed wire form of the whole batch: the concatenation
    /// of each command's packed form, in order.
    pub fn get_packed_pipeline(&self) -> Vec<u8> {
        let total = self.commands.iter().map(Cmd::packed_len).sum();
        let mut out = Vec::with_capacity(total);
        for cmd in &self.commands {
            cmd.write_packed_command(&mut out);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packed_pipeline_is_concatenation() {
        let mut p = pipe();
        p.cmd("PING");
        p.cmd("GET").arg("k");

        let mut expected = cmd("PING").get_packed_command();
        let mut get = cmd("GET");
        get.arg("k");
        expected.extend_from_slice(&get.get_packed_command());

        assert_eq!(p.get_packed_pipeline(), expected);
        assert_eq!(p.len(), 2);
    }

    #[test]
    fn empty_pipeline_packs_to_nothing() {
        let p = pipe();
        assert!(p.is_empty());
        assert!(p.get_packed_pipeline().is_empty());
    }
}

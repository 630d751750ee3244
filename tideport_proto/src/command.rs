// Outbound commands: the exact line format the judge accepts.
//
// Commands are collected into a `CommandBuffer` over the course of a frame
// and flushed in one write, terminated by the frame's `OK` line. Emission
// order within the buffer is preserved.
//
// Directions on the wire: 0 East, 1 West, 2 North, 3 South. Rotations:
// 0 clockwise, 1 anticlockwise.

use std::fmt;
use std::io::{self, Write};

/// One line of output to the judge.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    /// `move <robot> <dir>`
    Move { robot: usize, dir: u8 },
    /// `get <robot>` — pick up goods under the robot.
    Get { robot: usize },
    /// `pull <robot>` — drop goods into the berth slot under the robot.
    Pull { robot: usize },
    /// `lbot <x> <y>` — buy a robot at a robot shop cell.
    BuyRobot { x: i32, y: i32 },
    /// `lboat <x> <y>` — buy a ship at a ship shop cell.
    BuyShip { x: i32, y: i32 },
    /// `ship <id>` — advance the ship one cell along its heading.
    ShipForward { ship: usize },
    /// `rot <id> <0|1>` — rotate the ship.
    Rotate { ship: usize, dir: u8 },
    /// `berth <id>` — dock at the targeted berth.
    Berth { ship: usize },
    /// `dept <id>` — leave the berth for open water.
    Dept { ship: usize },
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Command::Move { robot, dir } => write!(f, "move {robot} {dir}"),
            Command::Get { robot } => write!(f, "get {robot}"),
            Command::Pull { robot } => write!(f, "pull {robot}"),
            Command::BuyRobot { x, y } => write!(f, "lbot {x} {y}"),
            Command::BuyShip { x, y } => write!(f, "lboat {x} {y}"),
            Command::ShipForward { ship } => write!(f, "ship {ship}"),
            Command::Rotate { ship, dir } => write!(f, "rot {ship} {dir}"),
            Command::Berth { ship } => write!(f, "berth {ship}"),
            Command::Dept { ship } => write!(f, "dept {ship}"),
        }
    }
}

/// Collects a frame's commands and writes them judge-side in one pass.
#[derive(Clone, Debug, Default)]
pub struct CommandBuffer {
    commands: Vec<Command>,
}

impl CommandBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, command: Command) {
        self.commands.push(command);
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    /// Write every buffered command, the closing `OK`, flush, and clear.
    pub fn flush_frame<W: Write>(&mut self, writer: &mut W) -> io::Result<()> {
        for command in &self.commands {
            writeln!(writer, "{command}")?;
        }
        writeln!(writer, "OK")?;
        writer.flush()?;
        self.commands.clear();
        Ok(())
    }
}

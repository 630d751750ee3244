// tideport_sim — the per-frame decision core of the harbor bot.
//
// This crate turns world snapshots into commands: map and distance fields,
// generic A* over the walking grid and the oriented ship poses, the robot
// and ship schedulers, next-frame conflict resolution, and purchase
// decisions. It performs no I/O — `tideport_proto` owns the wire format and
// `tideport_bot` owns stdin/stdout — so every component here is testable
// headless on hand-built maps.
//
// **Critical constraint: determinism.** The pipeline is a pure function of
// the input stream: iteration orders are fixed (id order, row-major scans,
// ordered conflict sets), hash maps are point-lookup only, and there is no
// randomness and no clock.

pub mod assets;
pub mod berth;
pub mod config;
pub mod game;
pub mod goods;
pub mod lanes;
pub mod map;
pub mod pathfinding;
pub mod queue;
pub mod robot;
pub mod robot_control;
pub mod robot_scheduler;
pub mod ship;
pub mod ship_scheduler;
pub mod types;

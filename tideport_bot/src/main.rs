// Judge-facing entry point: stdin in, commands out, logs to stderr.
//
// The loop is strict request/response: read the init block, answer frames
// until the judge closes the stream, exit. stdout belongs to the judge, so
// the tracing subscriber writes to stderr and is tuned with the standard
// env filter (`RUST_LOG`).
//
// Protocol errors are fatal by design — once the token stream desyncs
// there is nothing useful left to emit.

use std::io::{self, BufWriter, Write};

use tideport_proto::{read_frame, read_init, CommandBuffer};
use tideport_sim::config::Params;
use tideport_sim::game::GameManager;
use tracing::{error, info};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let stdin = io::stdin();
    let mut input = stdin.lock();
    let stdout = io::stdout();
    let mut output = BufWriter::new(stdout.lock());

    let init = match read_init(&mut input) {
        Ok(init) => init,
        Err(e) => {
            error!(%e, "failed to read init block");
            std::process::exit(1);
        }
    };

    let mut game = GameManager::new(&init, Params::default());
    // Acknowledge init.
    if writeln!(output, "OK").and_then(|_| output.flush()).is_err() {
        std::process::exit(1);
    }

    let mut commands = CommandBuffer::new();
    loop {
        match read_frame(&mut input, game.robot_count(), game.ship_count()) {
            Ok(Some(frame)) => {
                game.step(&frame, &mut commands);
                if let Err(e) = commands.flush_frame(&mut output) {
                    error!(%e, "failed to write commands");
                    std::process::exit(1);
                }
            }
            Ok(None) => {
                info!(frame = game.frame, "input closed, game over");
                break;
            }
            Err(e) => {
                error!(%e, "protocol error");
                std::process::exit(1);
            }
        }
    }
}

// Inbound protocol: the init block and per-frame snapshots.
//
// The judge speaks whitespace-separated tokens, so the reader here is a
// small tokenizer over any `BufRead` rather than a line parser. Counts for
// the robot and ship record lists come from the caller — the fleet grows
// with purchases, and only the decision core knows the current size.
//
// EOF at a frame boundary is the normal end of the game and surfaces as
// `Ok(None)`; EOF anywhere else, a malformed integer, or a missing `OK`
// sentinel is a `ProtocolError`, which callers treat as fatal.

use std::io::BufRead;
use thiserror::Error;

/// Number of rows in the init map block.
pub const MAP_ROWS: usize = 200;
/// Number of columns in the init map block.
pub const MAP_COLS: usize = 200;

/// Number of berth records in the init block.
pub const BERTH_COUNT: usize = 10;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("read error: {0}")]
    Io(#[from] std::io::Error),
    #[error("unexpected end of input while reading {context}")]
    UnexpectedEof { context: &'static str },
    #[error("malformed integer {token:?} while reading {context}")]
    MalformedInteger { token: String, context: &'static str },
    #[error("expected OK sentinel, found {found:?}")]
    MissingOk { found: String },
    #[error("map row {row} has {len} cells, expected {expected}")]
    MapShape { row: usize, len: usize, expected: usize },
}

/// The one-time init block.
#[derive(Clone, Debug)]
pub struct InitData {
    /// Raw map rows, alphabet `{'.', '*', '#', 'A', 'B'}`.
    pub map_rows: Vec<String>,
    pub berths: Vec<BerthRecord>,
    pub ship_capacity: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BerthRecord {
    pub id: usize,
    pub x: i32,
    pub y: i32,
    pub transport_time: u32,
    pub loading_velocity: u32,
}

/// One frame's world snapshot.
#[derive(Clone, Debug, Default)]
pub struct FrameInput {
    pub frame_id: u32,
    pub money: i64,
    pub new_goods: Vec<GoodsRecord>,
    pub robots: Vec<RobotRecord>,
    pub ships: Vec<ShipRecord>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GoodsRecord {
    pub x: i32,
    pub y: i32,
    pub value: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RobotRecord {
    pub carrying: bool,
    pub x: i32,
    pub y: i32,
    /// 0 stunned, 1 normal.
    pub state: u8,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ShipRecord {
    /// 0 normal, 1 recovering, 2 loading.
    pub state: u8,
    /// Berth association, -1 for none.
    pub berth_id: i32,
}

/// Whitespace tokenizer over a `BufRead`.
struct Tokens<'a, R: BufRead> {
    reader: &'a mut R,
}

impl<'a, R: BufRead> Tokens<'a, R> {
    fn new(reader: &'a mut R) -> Self {
        Self { reader }
    }

    /// The next whitespace-separated token, or `None` on clean EOF.
    fn next(&mut self) -> Result<Option<String>, ProtocolError> {
        let mut token = Vec::new();
        loop {
            let (consumed, token_complete, eof) = {
                let buf = self.reader.fill_buf()?;
                if buf.is_empty() {
                    (0, false, true)
                } else {
                    let mut consumed = 0;
                    let mut complete = false;
                    for &byte in buf {
                        consumed += 1;
                        if byte.is_ascii_whitespace() {
                            if token.is_empty() {
                                continue;
                            }
                            complete = true;
                            break;
                        }
                        token.push(byte);
                    }
                    (consumed, complete, false)
                }
            };
            self.reader.consume(consumed);
            if token_complete || eof {
                break;
            }
        }
        if token.is_empty() {
            Ok(None)
        } else {
            Ok(Some(String::from_utf8_lossy(&token).into_owned()))
        }
    }

    fn expect(&mut self, context: &'static str) -> Result<String, ProtocolError> {
        self.next()?
            .ok_or(ProtocolError::UnexpectedEof { context })
    }

    fn int<T: std::str::FromStr>(&mut self, context: &'static str) -> Result<T, ProtocolError> {
        let token = self.expect(context)?;
        token
            .parse()
            .map_err(|_| ProtocolError::MalformedInteger { token, context })
    }

    fn ok_sentinel(&mut self) -> Result<(), ProtocolError> {
        let token = self.expect("OK sentinel")?;
        if token == "OK" {
            Ok(())
        } else {
            Err(ProtocolError::MissingOk { found: token })
        }
    }
}

/// Read the init block: map rows, berth records, ship capacity, `OK`.
pub fn read_init<R: BufRead>(reader: &mut R) -> Result<InitData, ProtocolError> {
    let mut tokens = Tokens::new(reader);

    let mut map_rows = Vec::with_capacity(MAP_ROWS);
    for row in 0..MAP_ROWS {
        let line = tokens.expect("map row")?;
        if line.len() != MAP_COLS {
            return Err(ProtocolError::MapShape {
                row,
                len: line.len(),
                expected: MAP_COLS,
            });
        }
        map_rows.push(line);
    }

    let mut berths = Vec::with_capacity(BERTH_COUNT);
    for _ in 0..BERTH_COUNT {
        berths.push(BerthRecord {
            id: tokens.int("berth id")?,
            x: tokens.int("berth x")?,
            y: tokens.int("berth y")?,
            transport_time: tokens.int("berth transport time")?,
            loading_velocity: tokens.int("berth loading velocity")?,
        });
    }

    let ship_capacity = tokens.int("ship capacity")?;
    tokens.ok_sentinel()?;

    Ok(InitData {
        map_rows,
        berths,
        ship_capacity,
    })
}

/// Read one frame snapshot. `robot_count` and `ship_count` are the fleet
/// sizes the judge currently knows. Clean EOF before the frame header is
/// the end of the game.
pub fn read_frame<R: BufRead>(
    reader: &mut R,
    robot_count: usize,
    ship_count: usize,
) -> Result<Option<FrameInput>, ProtocolError> {
    let mut tokens = Tokens::new(reader);

    let Some(first) = tokens.next()? else {
        return Ok(None);
    };
    let frame_id = first
        .parse()
        .map_err(|_| ProtocolError::MalformedInteger {
            token: first,
            context: "frame id",
        })?;
    let money = tokens.int("money")?;

    let goods_count: usize = tokens.int("new goods count")?;
    let mut new_goods = Vec::with_capacity(goods_count);
    for _ in 0..goods_count {
        new_goods.push(GoodsRecord {
            x: tokens.int("goods x")?,
            y: tokens.int("goods y")?,
            value: tokens.int("goods value")?,
        });
    }

    let mut robots = Vec::with_capacity(robot_count);
    for _ in 0..robot_count {
        let carrying: u8 = tokens.int("robot carrying")?;
        robots.push(RobotRecord {
            carrying: carrying != 0,
            x: tokens.int("robot x")?,
            y: tokens.int("robot y")?,
            state: tokens.int("robot state")?,
        });
    }

    let mut ships = Vec::with_capacity(ship_count);
    for _ in 0..ship_count {
        ships.push(ShipRecord {
            state: tokens.int("ship state")?,
            berth_id: tokens.int("ship berth id")?,
        });
    }

    tokens.ok_sentinel()?;

    Ok(Some(FrameInput {
        frame_id,
        money,
        new_goods,
        robots,
        ships,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn init_block() -> String {
        let mut input = String::new();
        for _ in 0..MAP_ROWS {
            input.push_str(&".".repeat(MAP_COLS));
            input.push('\n');
        }
        for i in 0..BERTH_COUNT {
            input.push_str(&format!("{i} {} {} 500 2\n", i * 10, i * 10));
        }
        input.push_str("70\n");
        input.push_str("OK\n");
        input
    }

    #[test]
    fn init_block_parses() {
        let mut reader = Cursor::new(init_block());
        let init = read_init(&mut reader).unwrap();
        assert_eq!(init.map_rows.len(), MAP_ROWS);
        assert_eq!(init.berths.len(), BERTH_COUNT);
        assert_eq!(init.berths[3].x, 30);
        assert_eq!(init.berths[3].loading_velocity, 2);
        assert_eq!(init.ship_capacity, 70);
    }

    #[test]
    fn short_map_row_is_rejected() {
        let mut input = String::from("...\n");
        input.push_str(&init_block());
        let mut reader = Cursor::new(input);
        match read_init(&mut reader) {
            Err(ProtocolError::MapShape { row: 0, len: 3, .. }) => {}
            other => panic!("expected MapShape error, got {other:?}"),
        }
    }

    #[test]
    fn frame_parses_goods_robots_and_ships() {
        let input = "42 31415\n2\n10 20 55\n30 40 99\n0 5 6 1\n1 7 8 0\n2 3\nOK\n";
        let mut reader = Cursor::new(input);
        let frame = read_frame(&mut reader, 2, 1).unwrap().unwrap();
        assert_eq!(frame.frame_id, 42);
        assert_eq!(frame.money, 31415);
        assert_eq!(
            frame.new_goods,
            vec![
                GoodsRecord { x: 10, y: 20, value: 55 },
                GoodsRecord { x: 30, y: 40, value: 99 },
            ]
        );
        assert_eq!(frame.robots[0], RobotRecord { carrying: false, x: 5, y: 6, state: 1 });
        assert_eq!(frame.robots[1], RobotRecord { carrying: true, x: 7, y: 8, state: 0 });
        assert_eq!(frame.ships[0], ShipRecord { state: 2, berth_id: 3 });
    }

    #[test]
    fn eof_before_a_frame_ends_the_game() {
        let mut reader = Cursor::new("");
        assert!(read_frame(&mut reader, 0, 0).unwrap().is_none());
    }

    #[test]
    fn eof_inside_a_frame_is_fatal() {
        let mut reader = Cursor::new("42 100\n1\n");
        match read_frame(&mut reader, 0, 0) {
            Err(ProtocolError::UnexpectedEof { .. }) => {}
            other => panic!("expected UnexpectedEof, got {other:?}"),
        }
    }

    #[test]
    fn malformed_integer_is_fatal() {
        let mut reader = Cursor::new("42 money\n");
        match read_frame(&mut reader, 0, 0) {
            Err(ProtocolError::MalformedInteger { context: "money", .. }) => {}
            other => panic!("expected MalformedInteger, got {other:?}"),
        }
    }

    #[test]
    fn missing_ok_is_fatal() {
        let input = "42 100\n0\nNOPE\n";
        let mut reader = Cursor::new(input);
        match read_frame(&mut reader, 0, 0) {
            Err(ProtocolError::MissingOk { found }) => assert_eq!(found, "NOPE"),
            other => panic!("expected MissingOk, got {other:?}"),
        }
    }

    #[test]
    fn negative_berth_id_parses_for_undocked_ships() {
        let input = "1 0\n0\n0 -1\nOK\n";
        let mut reader = Cursor::new(input);
        let frame = read_frame(&mut reader, 0, 1).unwrap().unwrap();
        assert_eq!(frame.ships[0].berth_id, -1);
    }
}

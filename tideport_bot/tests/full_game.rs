// End-to-end: a full-size init block and a few frames through the protocol
// layer and the decision core, checking the judge-visible contract.

use tideport_proto::{read_frame, read_init, CommandBuffer};
use tideport_sim::config::Params;
use tideport_sim::game::GameManager;
use tideport_sim::robot::RobotStatus;

/// A 200×200 harbor: land on the west, sea east of column 150, ten berths
/// lined up against the waterline, two robot spawns inland.
fn init_text() -> String {
    let mut grid: Vec<Vec<char>> = (0..200)
        .map(|_| {
            (0..200)
                .map(|y| if y >= 150 { '*' } else { '.' })
                .collect()
        })
        .collect();

    let mut berth_lines = String::new();
    for i in 0..10 {
        let x = 5 + 19 * i;
        let y = 146;
        for dx in 0..4 {
            for dy in 0..4 {
                grid[x + dx][y + dy] = 'B';
            }
        }
        berth_lines.push_str(&format!("{i} {x} {y} 500 2\n"));
    }
    grid[20][20] = 'A';
    grid[100][30] = 'A';

    let mut text = String::new();
    for row in &grid {
        text.push_str(&row.iter().collect::<String>());
        text.push('\n');
    }
    text.push_str(&berth_lines);
    text.push_str("70\nOK\n");
    text
}

fn frame_text(game: &GameManager, frame_id: u32, money: i64, goods: &[(i32, i32, u32)]) -> String {
    let mut text = format!("{frame_id} {money}\n{}\n", goods.len());
    for (x, y, value) in goods {
        text.push_str(&format!("{x} {y} {value}\n"));
    }
    for robot in &game.robots {
        text.push_str(&format!(
            "{} {} {} 1\n",
            robot.carrying as u8, robot.pos.x, robot.pos.y
        ));
    }
    for _ in &game.ships {
        text.push_str("0 -1\n");
    }
    text.push_str("OK\n");
    text
}

#[test]
fn init_and_first_frames_follow_the_contract() {
    let mut reader = std::io::Cursor::new(init_text());
    let init = read_init(&mut reader).expect("init block parses");
    assert_eq!(init.berths.len(), 10);
    assert_eq!(init.ship_capacity, 70);

    let mut game = GameManager::new(&init, Params::default());
    assert_eq!(game.robot_count(), 2, "one robot per A cell");
    assert_eq!(game.ship_count(), 0);
    for berth in &game.berths {
        assert!(berth.docking_pose.is_some(), "berth {} docks", berth.id);
    }

    // Frame 1: fresh goods and full funds.
    let text = frame_text(&game, 1, 25000, &[(20, 22, 100), (100, 28, 55)]);
    let mut reader = std::io::Cursor::new(text);
    let frame = read_frame(&mut reader, game.robot_count(), game.ship_count())
        .unwrap()
        .expect("frame parses");

    let mut commands = CommandBuffer::new();
    game.step(&frame, &mut commands);
    let mut wire = Vec::new();
    commands.flush_frame(&mut wire).unwrap();
    let wire = String::from_utf8(wire).unwrap();

    assert!(wire.ends_with("OK\n"));
    assert!(wire.contains("lboat"), "bootstrap ship purchase: {wire}");
    assert!(wire.contains("move"), "robots start walking: {wire}");
    assert_eq!(game.ship_count(), 1);
    assert!(game
        .robots
        .iter()
        .any(|r| r.status == RobotStatus::MovingToGoods));
    assert!(game.map.temporary_obstacles_clear());

    // Frame 2 includes the purchased ship's record and still parses.
    let text = frame_text(&game, 2, 17000, &[]);
    let mut reader = std::io::Cursor::new(text);
    let frame = read_frame(&mut reader, game.robot_count(), game.ship_count())
        .unwrap()
        .expect("frame 2 parses");
    assert_eq!(frame.ships.len(), 1);

    let mut commands = CommandBuffer::new();
    game.step(&frame, &mut commands);
    let mut wire = Vec::new();
    commands.flush_frame(&mut wire).unwrap();
    let wire = String::from_utf8(wire).unwrap();
    assert!(wire.ends_with("OK\n"));
    assert!(game.map.temporary_obstacles_clear());
}

#[test]
fn ten_quiet_frames_stay_consistent() {
    let mut reader = std::io::Cursor::new(init_text());
    let init = read_init(&mut reader).unwrap();
    let mut game = GameManager::new(&init, Params::default());

    for f in 1..=10 {
        let goods = if f == 1 { vec![(40, 40, 60)] } else { Vec::new() };
        let text = frame_text(&game, f, 25000, &goods);
        let mut reader = std::io::Cursor::new(text);
        let frame = read_frame(&mut reader, game.robot_count(), game.ship_count())
            .unwrap()
            .unwrap();
        let mut commands = CommandBuffer::new();
        game.step(&frame, &mut commands);
        let mut wire = Vec::new();
        commands.flush_frame(&mut wire).unwrap();
        assert!(String::from_utf8(wire).unwrap().ends_with("OK\n"), "frame {f}");
        assert!(game.map.temporary_obstacles_clear(), "frame {f}");
        assert!(game.robot_count() <= Params::default().max_robot_num);
        assert!(game.ship_count() <= Params::default().max_ship_num);
    }
}

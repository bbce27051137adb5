use hexa_device_controller::*;
use std::io::{self, BufRead};
use tokio::sync::mpsc;

#[tokio::main]
async fn main() -> Result<()> {
    // Start the controller; this spawns the tick and motion drivers
    let controller = DeviceController::new();

    // Inform about successful initialization
    println!("OK");

    // Feed stdin lines through a channel so the drivers keep running while
    // we wait for input
    let (line_tx, mut line_rx) = mpsc::channel::<String>(16);
    std::thread::spawn(move || {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            if line_tx.blocking_send(line).is_err() {
                break;
            }
        }
    });

    // Mainloop: handle commands line by line until EOF or Ctrl-C
    loop {
        let line = tokio::select! {
            line = line_rx.recv() => match line {
                Some(line) => line,
                None => break,
            },
            _ = tokio::signal::ctrl_c() => break,
        };

        // Read command and execute it
        let mut cmd = line.trim().split(':');
        match cmd.next() {
            Some("register") => {
                let Some((id, name)) = id_and_rest(cmd.next()) else {
                    eprintln!("ERR No device id given");
                    continue;
                };
                match name {
                    Some(name) => controller.register_named(id, name),
                    None => controller.register(id),
                }
                // Respond with OK message
                println!("OK");
            }
            Some("deregister") => {
                let Some((id, _)) = id_and_rest(cmd.next()) else {
                    eprintln!("ERR No device id given");
                    continue;
                };
                controller.deregister(&id);
                println!("OK");
            }
            Some("set_speed") => {
                let Some((id, Some(level))) = id_and_rest(cmd.next()) else {
                    eprintln!("ERR Usage: set_speed:<id>,<level>");
                    continue;
                };
                let level = match level.parse::<SpeedLevel>() {
                    Ok(level) => level,
                    Err(e) => {
                        eprintln!("ERR {e}");
                        continue;
                    }
                };
                match controller.set_speed(&id, level) {
                    Ok(()) => println!("OK"),
                    Err(e) => eprintln!("ERR {e}"),
                }
            }
            Some("set_timer") => {
                let Some((id, Some(seconds))) = id_and_rest(cmd.next()) else {
                    eprintln!("ERR Usage: set_timer:<id>,<seconds>");
                    continue;
                };
                let Ok(seconds) = seconds.parse::<u32>() else {
                    eprintln!("ERR Invalid number of seconds: {seconds}");
                    continue;
                };
                match controller.set_timer(&id, seconds) {
                    Ok(()) => println!("OK"),
                    Err(e) => eprintln!("ERR {e}"),
                }
            }
            Some("clear_timer") => {
                let Some((id, _)) = id_and_rest(cmd.next()) else {
                    eprintln!("ERR No device id given");
                    continue;
                };
                match controller.clear_timer(&id) {
                    Ok(()) => println!("OK"),
                    Err(e) => eprintln!("ERR {e}"),
                }
            }
            Some("snapshot") => {
                let Some((id, _)) = id_and_rest(cmd.next()) else {
                    eprintln!("ERR No device id given");
                    continue;
                };
                match controller.snapshot(&id) {
                    Ok(state) => print_state(&id, &state),
                    Err(e) => eprintln!("ERR {e}"),
                }
            }
            Some("devices") => {
                for (id, state) in controller.devices() {
                    print_state(&id, &state);
                }
                println!("OK");
            }
            Some("") | None => {
                eprintln!("ERR No command given");
            }
            Some(other) => {
                eprintln!("ERR Unknown command: {other}");
            }
        }
    }

    controller.shutdown();
    Ok(())
}

/// Split a `<id>` or `<id>,<rest>` argument string
fn id_and_rest(args: Option<&str>) -> Option<(DeviceId, Option<&str>)> {
    let args = args?.trim();
    if args.is_empty() {
        return None;
    }
    match args.split_once(',') {
        Some((id, rest)) => Some((DeviceId::from(id.trim()), Some(rest.trim()))),
        None => Some((DeviceId::from(args), None)),
    }
}

/// Print one device state line in the wire format
fn print_state(id: &DeviceId, state: &DeviceState) {
    println!(
        "{} name={:?} speed={} remaining={} phase={:.1} motion={}",
        id, state.name, state.speed, state.remaining_seconds, state.rotation_phase,
        state.motion_active
    );
}

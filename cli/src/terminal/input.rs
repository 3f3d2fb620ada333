use std::io::IsTerminal;

use crossterm::event::{self, Event, KeyEventKind};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};

use crate::terminal::print;

/// Blocks until a key is pressed, so a double-clicked console stays open.
pub fn wait_for_key() {
    if !std::io::stdin().is_terminal() {
        return;
    }

    print::print_status("Press any key to exit");
    if enable_raw_mode().is_err() {
        return;
    }
    loop {
        match event::read() {
            Ok(Event::Key(key)) if key.kind == KeyEventKind::Press => break,
            Ok(_) => continue,
            Err(_) => break,
        }
    }
    let _ = disable_raw_mode();
}

//! Debugger application state and logic.

use crate::{Cpu, Memory};
use crate::cpu::memory::{MEMORY_SIZE, PROGRAM_START};
use crate::program::disasm::{disassemble_instruction, disassemble_range};
use std::collections::HashSet;

/// Bytes shown per row of the memory view.
pub const ROW_WIDTH: usize = 8;

/// Debugger application state.
pub struct DebuggerApp {
    /// The CPU being debugged.
    pub cpu: Cpu,
    /// Original image, restored on reset.
    pub image: Memory,
    /// Breakpoints (by address).
    pub breakpoints: HashSet<u8>,
    /// Is the debugger running continuously?
    pub running: bool,
    /// Should we quit?
    pub should_quit: bool,
    /// Status message to display.
    pub status: String,
    /// Memory view scroll offset, in rows.
    pub mem_scroll: usize,
}

impl DebuggerApp {
    /// Create a new debugger over a memory image.
    pub fn new(image: Memory) -> Self {
        Self {
            cpu: Cpu::with_memory(image.clone()),
            image,
            breakpoints: HashSet::new(),
            running: false,
            should_quit: false,
            status: "Ready. Press 's' to step, 'r' to run, 'q' to quit.".into(),
            mem_scroll: 0,
        }
    }

    /// Step one instruction.
    pub fn step(&mut self) {
        if !self.cpu.is_running() {
            self.status = format!("CPU stopped: {:?}", self.cpu.state);
            self.running = false;
            return;
        }

        let pc = self.cpu.regs.pc;
        let bytes = self.cpu.mem.fetch(pc);
        match self.cpu.step() {
            Ok(_) => {
                self.status = format!("0x{:02X}: {}", pc, disassemble_instruction(pc, bytes));
            }
            Err(e) => {
                self.status = format!("Fault: {}", e);
                self.running = false;
            }
        }
    }

    /// Run until halt, breakpoint, or fault.
    pub fn run(&mut self) {
        self.running = true;
        self.status = "Running...".into();
    }

    /// Run one iteration of continuous execution.
    pub fn tick(&mut self) {
        if !self.running {
            return;
        }

        if !self.cpu.is_running() {
            self.running = false;
            self.status = format!("{:?} after {} cycles", self.cpu.state, self.cpu.cycles);
            return;
        }

        self.step();

        // Stop before executing the instruction under a breakpoint.
        let pc = self.cpu.regs.pc;
        if self.running && self.breakpoints.contains(&pc) {
            self.running = false;
            self.status = format!("Breakpoint at 0x{:02X}", pc);
        }
    }

    /// Toggle breakpoint at current PC.
    pub fn toggle_breakpoint(&mut self) {
        let pc = self.cpu.regs.pc;
        if self.breakpoints.remove(&pc) {
            self.status = format!("Removed breakpoint at 0x{:02X}", pc);
        } else {
            self.breakpoints.insert(pc);
            self.status = format!("Set breakpoint at 0x{:02X}", pc);
        }
    }

    /// Reset CPU and memory to the original image.
    pub fn reset(&mut self) {
        self.cpu = Cpu::with_memory(self.image.clone());
        self.running = false;
        self.status = "Reset. Ready.".into();
    }

    /// Scroll the memory view by `delta` rows.
    pub fn scroll_memory(&mut self, delta: isize) {
        let max = MEMORY_SIZE / ROW_WIDTH - 1;
        self.mem_scroll = self.mem_scroll.saturating_add_signed(delta).min(max);
    }

    /// Get disassembly around current PC.
    pub fn get_disassembly(&self, lines: usize) -> Vec<(u8, String, bool)> {
        let pc = self.cpu.regs.pc;

        let mut start = pc;
        for _ in 0..lines / 2 {
            match start.checked_sub(3) {
                Some(prev) if prev >= PROGRAM_START => start = prev,
                _ => break,
            }
        }

        disassemble_range(&self.cpu.mem, start, lines)
            .into_iter()
            .map(|(addr, text)| (addr, text, addr == pc))
            .collect()
    }
}

/// Run the debugger over a memory image.
pub fn run_debugger(image: Memory) -> std::io::Result<()> {
    use crossterm::{
        event::{self, Event, KeyCode, KeyEventKind},
        terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
        ExecutableCommand,
    };
    use ratatui::prelude::*;
    use std::io::stdout;
    use std::time::Duration;

    // Setup terminal
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;

    let mut app = DebuggerApp::new(image);

    // Main loop
    loop {
        terminal.draw(|frame| {
            super::ui::draw(frame, &app);
        })?;

        if event::poll(Duration::from_millis(50))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    match key.code {
                        KeyCode::Char('q') => app.should_quit = true,
                        KeyCode::Char('s') => {
                            app.running = false;
                            app.step();
                        }
                        KeyCode::Char('r') => app.run(),
                        KeyCode::Char('p') => {
                            app.running = false;
                            app.status = "Paused.".into();
                        }
                        KeyCode::Char('b') => app.toggle_breakpoint(),
                        KeyCode::Char('x') => app.reset(),
                        KeyCode::Up => app.scroll_memory(-1),
                        KeyCode::Down => app.scroll_memory(1),
                        _ => {}
                    }
                }
            }
        }

        // Tick for continuous running
        if app.running {
            app.tick();
        }

        if app.should_quit {
            break;
        }
    }

    // Restore terminal
    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;

    Ok(())
}

use std::io::{self, Stderr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Result;
use crossterm::{
    event::{self, Event, KeyEvent, KeyEventKind, MouseEvent, MouseEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use futures_util::StreamExt;
use insight_core::PointerCapture;
use ratatui::{backend::CrosstermBackend, Terminal};
use tokio::sync::mpsc;
use tracing::debug;

pub type Tui = Terminal<CrosstermBackend<Stderr>>;

const TICK_MS: u64 = 100;

#[derive(Debug)]
pub enum AppEvent {
    Key(KeyEvent),
    Mouse(MouseEvent),
    Resize,
    Tick,
}

/// Shared switch deciding whether drag and motion events leave the reader.
///
/// Attached only while a sidebar drag is in progress; otherwise those events
/// are dropped before they reach the channel.
#[derive(Debug, Clone, Default)]
pub struct PointerTracking(Arc<AtomicBool>);

impl PointerTracking {
    pub fn is_attached(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

impl PointerCapture for PointerTracking {
    fn attach(&self) {
        debug!("pointer tracking attached");
        self.0.store(true, Ordering::Relaxed);
    }

    fn detach(&self) {
        debug!("pointer tracking detached");
        self.0.store(false, Ordering::Relaxed);
    }
}

fn is_tracked_motion(kind: MouseEventKind) -> bool {
    matches!(
        kind,
        MouseEventKind::Drag(_) | MouseEventKind::Moved | MouseEventKind::Up(_)
    )
}

fn translate(evt: Event, tracking: &PointerTracking) -> Option<AppEvent> {
    match evt {
        // Only handle key press events, not release
        Event::Key(key) if key.kind == KeyEventKind::Press => Some(AppEvent::Key(key)),
        Event::Mouse(mouse) if is_tracked_motion(mouse.kind) && !tracking.is_attached() => None,
        Event::Mouse(mouse) => Some(AppEvent::Mouse(mouse)),
        // The next draw picks up the new size
        Event::Resize(_, _) => Some(AppEvent::Resize),
        _ => None,
    }
}

pub struct EventHandler {
    rx: mpsc::UnboundedReceiver<AppEvent>,
    _tx: mpsc::UnboundedSender<AppEvent>,
}

impl EventHandler {
    pub fn new(tracking: PointerTracking) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let _tx = tx.clone();

        let tx_events = tx.clone();
        tokio::spawn(async move {
            let mut reader = event::EventStream::new();
            while let Some(evt) = reader.next().await {
                let Ok(evt) = evt else { continue };
                if let Some(event) = translate(evt, &tracking) {
                    if tx_events.send(event).is_err() {
                        break;
                    }
                }
            }
        });

        // Tick drives task polling and the loading/chart animations
        let tx_tick = tx.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(std::time::Duration::from_millis(TICK_MS));
            loop {
                interval.tick().await;
                if tx_tick.send(AppEvent::Tick).is_err() {
                    break;
                }
            }
        });

        Self { rx, _tx }
    }

    pub async fn next(&mut self) -> Option<AppEvent> {
        self.rx.recv().await
    }
}

pub fn init() -> Result<Tui> {
    enable_raw_mode()?;
    execute!(io::stderr(), EnterAlternateScreen)?;

    // Enable mouse capture
    execute!(io::stderr(), crossterm::event::EnableMouseCapture)?;

    let backend = CrosstermBackend::new(io::stderr());
    let terminal = Terminal::new(backend)?;

    Ok(terminal)
}

pub fn restore() -> Result<()> {
    execute!(io::stderr(), crossterm::event::DisableMouseCapture)?;
    execute!(io::stderr(), LeaveAlternateScreen)?;
    disable_raw_mode()?;
    Ok(())
}

/// Install panic hook to restore terminal on panic
pub fn install_panic_hook() {
    let original_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        let _ = restore();
        original_hook(panic_info);
    }));
}

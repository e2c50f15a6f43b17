use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers, MouseButton, MouseEvent, MouseEventKind};
use ratatui::layout::Rect;

use crate::app::{App, InputMode, LineEditor};
use crate::tui::AppEvent;

const WHEEL_ROWS: u16 = 3;

pub async fn handle_event(app: &mut App, event: AppEvent) -> Result<()> {
    match event {
        AppEvent::Key(key) => handle_key(app, key),
        AppEvent::Mouse(mouse) => handle_mouse(app, mouse),
        AppEvent::Resize => {}
        AppEvent::Tick => {
            app.poll_tasks();
            app.tick_animation();
        }
    }
    Ok(())
}

fn handle_key(app: &mut App, key: KeyEvent) {
    // Global keys that work in any mode
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        app.should_quit = true;
        return;
    }

    // The alert blocks everything else until dismissed
    if app.alert.is_some() {
        if matches!(key.code, KeyCode::Enter | KeyCode::Esc) {
            app.dismiss_alert();
        }
        return;
    }

    match app.input_mode {
        InputMode::Chat => handle_chat_key(app, key),
        InputMode::AttachPath => handle_attach_key(app, key),
    }
}

fn handle_chat_key(app: &mut App, key: KeyEvent) {
    if key.modifiers.contains(KeyModifiers::CONTROL) {
        match key.code {
            KeyCode::Char('o') => app.open_attach_prompt(),
            KeyCode::Char('x') => app.remove_attachment(),
            KeyCode::Char('t') => app.toggle_theme(),
            KeyCode::Char('a') => app.cycle_agent_mode(),
            KeyCode::Char('e') => app.toggle_error_details(),
            _ => {}
        }
        return;
    }

    match key.code {
        KeyCode::Enter => app.submit(),
        KeyCode::Esc => app.cancel_attachment(),
        KeyCode::PageUp => app.scroll_up(app.page_rows()),
        KeyCode::PageDown => app.scroll_down(app.page_rows()),
        _ => edit_line(&mut app.input, key),
    }
}

fn handle_attach_key(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => {
            app.attach_input.clear();
            app.input_mode = InputMode::Chat;
        }
        KeyCode::Enter => app.confirm_attachment(),
        _ => edit_line(&mut app.attach_input, key),
    }
}

fn edit_line(editor: &mut LineEditor, key: KeyEvent) {
    match key.code {
        KeyCode::Backspace => editor.backspace(),
        KeyCode::Delete => editor.delete(),
        KeyCode::Left => editor.left(),
        KeyCode::Right => editor.right(),
        KeyCode::Home => editor.home(),
        KeyCode::End => editor.end(),
        KeyCode::Char(c) if !key.modifiers.contains(KeyModifiers::CONTROL) => editor.insert(c),
        _ => {}
    }
}

fn point_in_rect(x: u16, y: u16, rect: Rect) -> bool {
    x >= rect.x && x < rect.x + rect.width && y >= rect.y && y < rect.y + rect.height
}

/// The sidebar's right border column, with one column of slack either side.
fn on_sidebar_border(x: u16, y: u16, sidebar: Rect) -> bool {
    let border = sidebar.x + sidebar.width.saturating_sub(1);
    y >= sidebar.y && y < sidebar.y + sidebar.height && x + 1 >= border && x <= border + 1
}

fn handle_mouse(app: &mut App, mouse: MouseEvent) {
    let x = mouse.column;
    let y = mouse.row;

    match mouse.kind {
        MouseEventKind::Down(MouseButton::Left) => {
            if app.sidebar_area.is_some_and(|r| on_sidebar_border(x, y, r)) {
                // Border sits at the sidebar's right edge, i.e. its width in columns
                app.begin_sidebar_drag(x + 1);
            }
        }
        MouseEventKind::Drag(MouseButton::Left) => {
            if app.sidebar.is_dragging() {
                app.drag_sidebar(x + 1);
            }
        }
        MouseEventKind::Up(_) => {
            if app.sidebar.is_dragging() {
                app.end_sidebar_drag();
            }
        }
        MouseEventKind::ScrollUp => {
            if app.chat_area.is_some_and(|r| point_in_rect(x, y, r)) {
                app.scroll_up(WHEEL_ROWS);
            }
        }
        MouseEventKind::ScrollDown => {
            if app.chat_area.is_some_and(|r| point_in_rect(x, y, r)) {
                app.scroll_down(WHEEL_ROWS);
            }
        }
        _ => {}
    }
}

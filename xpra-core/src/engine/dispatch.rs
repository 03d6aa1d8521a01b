//! Incoming command handlers.
//!
//! Handlers return `None` when the packet is missing a field or has the
//! wrong kind somewhere; the dispatcher logs and drops it.

use tracing::{debug, info, warn};

use super::Engine;
use super::timers::TimerKind;
use crate::collab::{DrawImage, DrawUpdate};
use crate::message::{self, Command};
use crate::state::ConnectionState;
use crate::value::Value;
use crate::window::{PRIMARY_WINDOW, WindowRecord};

fn int(args: &[Value], i: usize) -> Option<i64> {
    args.get(i)?.as_int()
}

fn dim(args: &[Value], i: usize) -> Option<u32> {
    u32::try_from(int(args, i)?).ok()
}

fn empty_dict() -> Value {
    Value::Dict(Default::default())
}

impl Engine {
    /// Route one decoded message. `started_ms` is when its first bytes
    /// arrived.
    pub(super) fn dispatch(&mut self, message: Value, started_ms: i64) {
        let mut items = match message {
            Value::List(items) => items,
            other => {
                warn!("dropping {} message", other.kind());
                return;
            }
        };
        let Some((tag, args)) = items.split_first_mut() else {
            return;
        };
        let Some(tag) = tag.as_bytes() else {
            warn!("dropping message with a {} tag", tag.kind());
            return;
        };
        let Some(cmd) = Command::from_tag(tag).filter(Command::is_incoming) else {
            warn!("no handler for packet type '{}'", String::from_utf8_lossy(tag));
            return;
        };
        info!("received {cmd}");

        let handled = match cmd {
            Command::Hello => self.on_hello(args),
            Command::NewWindow => self.on_new_window(args),
            Command::WindowMoveResize => self.on_window_move_resize(args),
            Command::LostWindow => self.on_lost_window(args),
            Command::Ping => self.on_ping(args),
            Command::PingEcho => self.on_ping_echo(args),
            Command::Draw => self.on_draw(args, started_ms),
            Command::Bell => self.on_bell(args),
            Command::ClipboardContents => self.on_clipboard(args),
            Command::Disconnect => self.on_server_disconnect(args),
            _ => Some(()),
        };
        if handled.is_none() {
            warn!("malformed {cmd} packet ({} args)", args.len());
        }
    }

    fn on_hello(&mut self, args: &mut [Value]) -> Option<()> {
        if self.state() != ConnectionState::Handshake {
            warn!("ignoring hello in state '{}'", self.state());
            return Some(());
        }
        if let Some(version) = args
            .first()
            .and_then(|caps| caps.get(b"version"))
            .and_then(Value::as_str)
        {
            info!("server version {version}");
        }

        self.send(Command::SetDeflate, message::set_deflate(0));
        self.update_state(ConnectionState::Normal, Some("Connected"));

        let now = self.clock.now_ms();
        self.timers.arm(TimerKind::Flush, now, self.config.flush_interval());
        self.send_ping(now);
        self.timers.arm(TimerKind::Ping, now, self.config.ping_interval());
        Some(())
    }

    fn on_new_window(&mut self, args: &mut [Value]) -> Option<()> {
        let wid = int(args, 0)?;
        let x = int(args, 1)?;
        let y = int(args, 2)?;
        let width = dim(args, 3)?;
        let height = dim(args, 4)?;
        if wid != PRIMARY_WINDOW {
            warn!("ignoring new-window for untracked window {wid}");
            return Some(());
        }

        self.resize_framebuffer(width, height);
        let record = WindowRecord {
            id: wid,
            x,
            y,
            width,
            height,
            properties: args.get(5).cloned().unwrap_or_else(empty_dict),
            placement: args.get(6).cloned().unwrap_or_else(empty_dict),
        };
        let map = message::map_window(&record);
        self.windows.insert(record);

        self.enqueue(Command::MapWindow, map);
        self.enqueue(Command::Focus, message::focus(wid));
        self.input.grab();
        Some(())
    }

    fn on_window_move_resize(&mut self, args: &mut [Value]) -> Option<()> {
        let wid = int(args, 0)?;
        let x = int(args, 1)?;
        let y = int(args, 2)?;
        let width = dim(args, 3)?;
        let height = dim(args, 4)?;
        let Some(window) = self.windows.get_mut(wid) else {
            warn!("move-resize for unknown window {wid}");
            return Some(());
        };
        window.x = x;
        window.y = y;
        window.width = width;
        window.height = height;
        if wid == PRIMARY_WINDOW {
            self.resize_framebuffer(width, height);
        }
        Some(())
    }

    fn on_lost_window(&mut self, args: &mut [Value]) -> Option<()> {
        let wid = int(args, 0)?;
        if self.windows.remove(wid).is_none() {
            warn!("lost-window for unknown window {wid}");
        } else if wid == PRIMARY_WINDOW {
            self.input.ungrab();
        }
        Some(())
    }

    fn on_ping(&mut self, args: &mut [Value]) -> Option<()> {
        let echo_time = int(args, 0)?;
        let latency = self.latency.last_server_latency();
        self.send(
            Command::PingEcho,
            message::ping_echo(Value::Int(echo_time), latency),
        );
        Some(())
    }

    fn on_ping_echo(&mut self, args: &mut [Value]) -> Option<()> {
        let echoed = int(args, 0)?;
        let client = int(args, 4);
        let now = self.clock.now_ms();
        let rtt = self.latency.record_echo(now, echoed, client);
        debug!("server latency {rtt} ms");
        Some(())
    }

    fn on_draw(&mut self, args: &mut [Value], started_ms: i64) -> Option<()> {
        let wid = int(args, 0)?;
        let x = int(args, 1)?;
        let y = int(args, 2)?;
        let width = dim(args, 3)?;
        let height = dim(args, 4)?;
        let coding = args.get(5)?.as_str()?.to_owned();
        let data = match args.get_mut(6)? {
            Value::Bytes(data) => std::mem::take(data),
            _ => return None,
        };
        let sequence = int(args, 7)?;
        let rowstride = int(args, 8).unwrap_or(0);

        if wid != PRIMARY_WINDOW || !self.windows.contains(wid) {
            warn!("ignoring draw for unknown window {wid}");
            return Some(());
        }

        let update = DrawUpdate {
            wid,
            x,
            y,
            width,
            height,
            coding,
            sequence,
            rowstride,
        };
        self.status.on_update_received(&update);
        self.display.render_enqueue(DrawImage {
            update: update.clone(),
            data,
        });
        self.status.on_update_complete(&update);
        self.stats.draws += 1;

        let decode_us = self
            .clock
            .now_ms()
            .saturating_sub(started_ms)
            .max(0)
            .saturating_mul(1000);
        self.enqueue(
            Command::DamageSequence,
            message::damage_sequence(sequence, wid, width, height, decode_us),
        );
        Some(())
    }

    fn on_bell(&mut self, args: &mut [Value]) -> Option<()> {
        let wid = int(args, 0)?;
        self.status.on_bell(wid);
        Some(())
    }

    fn on_clipboard(&mut self, args: &mut [Value]) -> Option<()> {
        let data = args.get(5)?.as_bytes()?;
        let text = String::from_utf8_lossy(data);
        self.status.on_clipboard(&text);
        Some(())
    }

    fn on_server_disconnect(&mut self, args: &mut [Value]) -> Option<()> {
        let reason = args
            .first()
            .and_then(Value::as_str)
            .unwrap_or("no reason given");
        let msg = format!("Server requested disconnect: {reason}");
        self.fail(msg);
        Some(())
    }

    fn resize_framebuffer(&mut self, width: u32, height: u32) {
        if self.fb_size == (width, height) {
            return;
        }
        info!("framebuffer resized to {width}x{height}");
        self.fb_size = (width, height);
        self.status.on_fb_resize(width, height);
        self.display.resize(width, height);
    }
}

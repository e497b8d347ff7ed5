use std::io::Write;
use std::time::{Duration, Instant};

use crate::clock::Renderer;
use crate::scheduler::{Activation, CommentHandle};

pub(super) fn format_timestamp(secs: f64) -> String {
    let total = secs.max(0.0) as u64;
    format!("{:02}:{:02}", total / 60, total % 60)
}

pub(super) fn truncate(value: &str, max_chars: usize) -> String {
    let count = value.chars().count();
    if count <= max_chars {
        return value.to_string();
    }
    if max_chars <= 3 {
        return ".".repeat(max_chars);
    }
    let mut out = value.chars().take(max_chars - 3).collect::<String>();
    out.push_str("...");
    out
}

/// Text renderer for simulated sessions: one line per transition, and a
/// fixed on-screen time after which a comment is reported as finished.
pub(super) struct PrintRenderer<W: Write> {
    out: W,
    visible_for: Duration,
    on_screen: Vec<(CommentHandle, Instant)>,
}

impl<W: Write> PrintRenderer<W> {
    pub(super) fn new(out: W, visible_for: Duration) -> Self {
        Self {
            out,
            visible_for,
            on_screen: Vec::new(),
        }
    }

    #[cfg(test)]
    pub(super) fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> Renderer for PrintRenderer<W> {
    fn activate(&mut self, activation: Activation) {
        let comment = &activation.comment;
        let _ = writeln!(
            self.out,
            "[+] #{:<5} {} {:<6} #{} {} (cid {})",
            activation.handle.id(),
            format_timestamp(comment.time_offset_secs),
            comment.mode().label(),
            comment.color_hex,
            truncate(&comment.text, 60),
            comment.id
        );
        self.on_screen.push((activation.handle, Instant::now()));
    }

    fn expire(&mut self, handle: CommentHandle) {
        self.on_screen.retain(|(shown, _)| *shown != handle);
        let _ = writeln!(self.out, "[-] #{}", handle.id());
    }

    fn finished(&mut self) -> Vec<CommentHandle> {
        let visible_for = self.visible_for;
        let mut done = Vec::new();
        self.on_screen.retain(|(handle, shown_at)| {
            let finished = shown_at.elapsed() >= visible_for;
            if finished {
                done.push(*handle);
            }
            !finished
        });
        for handle in &done {
            let _ = writeln!(self.out, "[~] #{}", handle.id());
        }
        done
    }
}

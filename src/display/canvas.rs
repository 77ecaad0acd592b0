//! A fixed size character grid the frame is drawn on before it reaches the
//! terminal.

use std::io::Write;

use crossterm::{
    cursor::MoveTo,
    queue,
    style::{Attribute, Color, Print, ResetColor, SetAttribute, SetForegroundColor},
    Result,
};

/// Colour roles of the interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    Plain,
    Success,
    Error,
    Warning,
    Info,
    Progress,
    Header,
}
impl Tone {
    fn color(self) -> Color {
        match self {
            Tone::Plain => Color::Reset,
            Tone::Success => Color::Green,
            Tone::Error => Color::Red,
            Tone::Warning => Color::Yellow,
            Tone::Info => Color::Blue,
            Tone::Progress => Color::Cyan,
            Tone::Header => Color::Magenta,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Cell {
    ch: char,
    tone: Tone,
    bold: bool,
}
const BLANK: Cell = Cell {
    ch: ' ',
    tone: Tone::Plain,
    bold: false,
};

#[derive(Debug, Clone)]
pub struct Canvas {
    width: u16,
    height: u16,
    cells: Vec<Cell>,
}
impl Canvas {
    pub fn new(width: u16, height: u16) -> Self {
        Canvas {
            width,
            height,
            cells: vec![BLANK; usize::from(width) * usize::from(height)],
        }
    }

    pub fn width(&self) -> u16 {
        self.width
    }

    pub fn height(&self) -> u16 {
        self.height
    }

    /// Write `text` at (`row`, `col`), cut at the right edge. Out of bounds
    /// writes are dropped.
    pub fn put(&mut self, row: u16, col: u16, text: &str, tone: Tone, bold: bool) {
        if row >= self.height || col >= self.width {
            return;
        }
        let start = usize::from(row) * usize::from(self.width);
        let room = usize::from(self.width - col);
        for (offset, ch) in text.chars().take(room).enumerate() {
            self.cells[start + usize::from(col) + offset] = Cell { ch, tone, bold };
        }
    }

    /// Text of a row, trailing blanks removed.
    pub fn line(&self, row: u16) -> String {
        if row >= self.height {
            return String::new();
        }
        let start = usize::from(row) * usize::from(self.width);
        let text: String = self.cells[start..start + usize::from(self.width)]
            .iter()
            .map(|cell| cell.ch)
            .collect();
        text.trim_end().to_owned()
    }

    /// Tone of a single cell, for inspection.
    pub fn tone_at(&self, row: u16, col: u16) -> Option<Tone> {
        if row >= self.height || col >= self.width {
            return None;
        }
        Some(self.cells[usize::from(row) * usize::from(self.width) + usize::from(col)].tone)
    }

    /// Queue the whole grid to `out`, one styled run at a time, then flush.
    pub fn present<W: Write>(&self, out: &mut W) -> Result<()> {
        for row in 0..self.height {
            queue!(out, MoveTo(0, row))?;
            let start = usize::from(row) * usize::from(self.width);
            let cells = &self.cells[start..start + usize::from(self.width)];

            let mut run = String::new();
            let mut style = (Tone::Plain, false);
            for cell in cells {
                if (cell.tone, cell.bold) != style && !run.is_empty() {
                    print_run(out, &run, style)?;
                    run.clear();
                }
                style = (cell.tone, cell.bold);
                run.push(cell.ch);
            }
            print_run(out, &run, style)?;
        }
        out.flush()?;
        Ok(())
    }
}

fn print_run<W: Write>(out: &mut W, text: &str, (tone, bold): (Tone, bool)) -> Result<()> {
    let weight = if bold {
        Attribute::Bold
    } else {
        Attribute::NormalIntensity
    };
    queue!(
        out,
        SetForegroundColor(tone.color()),
        SetAttribute(weight),
        Print(text),
        ResetColor,
        SetAttribute(Attribute::Reset)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_are_clipped() {
        let mut canvas = Canvas::new(10, 2);
        canvas.put(0, 6, "overflow", Tone::Error, false);
        canvas.put(5, 0, "nowhere", Tone::Plain, false);
        canvas.put(1, 0, "ok", Tone::Success, true);

        assert_eq!(canvas.line(0), "      over");
        assert_eq!(canvas.line(1), "ok");
        assert_eq!(canvas.tone_at(0, 9), Some(Tone::Error));
        assert_eq!(canvas.tone_at(1, 5), Some(Tone::Plain));
        assert_eq!(canvas.tone_at(2, 0), None);
    }

    #[test]
    fn present_emits_every_row() {
        let mut canvas = Canvas::new(4, 2);
        canvas.put(1, 0, "ab", Tone::Info, true);
        let mut out = Vec::new();
        canvas.present(&mut out).unwrap();

        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("ab"));
        assert!(text.contains("\u{1b}[2;1H"));
    }
}

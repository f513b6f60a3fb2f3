//! IRC mIRC-style formatting control codes → XHTML-IM (spec.md §8 concrete
//! scenario 4; grounded on `irc_format_to_xhtmlim` in
//! `examples/original_source/src/bridge/colors.cpp`).
//!
//! IRC bodies carry bold/underline/italic/color/reset as raw control bytes
//! in-band. [`irc_format_to_xhtmlim`] strips them into a plain-text "clean"
//! string (what goes in `<body/>`) plus, when any formatting was present, an
//! XHTML-IM `<body xmlns='http://www.w3.org/1999/xhtml'/>` tree carrying the
//! same text wrapped in one-level-deep `<span style="...">` runs — the same
//! "close the current span, recompute the full style, reopen" approach the
//! original uses, since IRC's flat formatting doesn't nest cleanly into XML.
//!
//! Line breaks (`\n`) are deliberately left untouched: spec.md's Non-goals
//! exclude preserving IRC-side line breaks inside a `<body/>`, so `\n` is
//! not one of the recognized format characters here.

use minidom::Element;

const BOLD: char = '\u{02}';
const COLOR: char = '\u{03}';
const RESET: char = '\u{0F}';
const ITALIC: char = '\u{1D}';
const UNDERLINE: char = '\u{1F}';

pub const XHTML_NS: &str = "http://www.w3.org/1999/xhtml";

const IRC_COLORS: [&str; 16] = [
    "white",
    "black",
    "blue",
    "green",
    "indianred",
    "red",
    "magenta",
    "brown",
    "yellow",
    "lightgreen",
    "cyan",
    "lightcyan",
    "lightblue",
    "lightmagenta",
    "gray",
    "white",
];

fn is_format_char(c: char) -> bool {
    matches!(c, BOLD | COLOR | RESET | ITALIC | UNDERLINE)
}

#[derive(Default, Clone, Copy)]
struct Styles {
    bold: bool,
    underline: bool,
    italic: bool,
    fg: Option<u8>,
    bg: Option<u8>,
}

impl Styles {
    fn css(&self) -> String {
        let mut s = String::new();
        if self.bold {
            s.push_str("font-weight:bold;");
        }
        if self.underline {
            s.push_str("text-decoration:underline;");
        }
        if self.italic {
            s.push_str("font-style:italic;");
        }
        if let Some(fg) = self.fg {
            s.push_str(&format!("color:{};", IRC_COLORS[fg as usize % 16]));
        }
        if let Some(bg) = self.bg {
            s.push_str(&format!("background-color:{};", IRC_COLORS[bg as usize % 16]));
        }
        s
    }
}

/// Parses at most two decimal digits starting at `chars[*i]`, advancing `*i`
/// past what it consumed. Returns `None` if `chars[*i]` isn't a digit.
fn take_color_number(chars: &[char], i: &mut usize) -> Option<u8> {
    let first = *chars.get(*i)?;
    let first = first.to_digit(10)?;
    *i += 1;
    let mut value = first;
    if let Some(d) = chars.get(*i).and_then(|c| c.to_digit(10)) {
        value = value * 10 + d;
        *i += 1;
    }
    Some(value as u8)
}

/// Strips mIRC formatting control codes out of `s`, returning the clean
/// text and, when any formatting was actually present, the XHTML-IM
/// `<body/>` tree carrying it.
pub fn irc_format_to_xhtmlim(s: &str) -> (String, Option<Element>) {
    if !s.contains(is_format_char) {
        return (s.to_owned(), None);
    }

    let chars: Vec<char> = s.chars().collect();
    let mut clean = String::new();
    let mut root = Element::bare("body", XHTML_NS);
    let mut style = Styles::default();
    let mut span: Option<Element> = None;
    let mut text_run = String::new();

    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if !is_format_char(c) {
            text_run.push(c);
            clean.push(c);
            i += 1;
            continue;
        }

        if !text_run.is_empty() {
            let text = std::mem::take(&mut text_run);
            match &mut span {
                Some(sp) => {
                    sp.append_text_node(text);
                }
                None => {
                    root.append_text_node(text);
                }
            }
        }

        i += 1;
        match c {
            BOLD => style.bold = !style.bold,
            UNDERLINE => style.underline = !style.underline,
            ITALIC => style.italic = !style.italic,
            RESET => style = Styles::default(),
            COLOR => {
                style.fg = take_color_number(&chars, &mut i);
                style.bg = None;
                if chars.get(i) == Some(&',') {
                    let after_comma = i + 1;
                    let mut probe = after_comma;
                    if let Some(bg) = take_color_number(&chars, &mut probe) {
                        style.bg = Some(bg);
                        i = probe;
                    }
                }
            }
            _ => unreachable!("is_format_char only matches the arms above"),
        }

        if let Some(sp) = span.take() {
            root.append_child(sp);
        }
        let css = style.css();
        if !css.is_empty() {
            span = Some(Element::builder("span", XHTML_NS).attr("style", css).build());
        }
    }

    if !text_run.is_empty() {
        match &mut span {
            Some(sp) => sp.append_text_node(text_run),
            None => root.append_text_node(text_run),
        }
    }
    if let Some(sp) = span {
        root.append_child(sp);
    }

    (clean, Some(root))
}

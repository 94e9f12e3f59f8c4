use colored::{Color, ColoredString, Colorize};

use crate::testing::Verdict;

pub fn is_truecolor_supported() -> bool {
    let Ok(v) = std::env::var("COLORTERM") else {
        return false
    };
    matches!(v.as_str(), "truecolor" | "24bit")
}

pub trait ColorTheme {
    fn color(&self) -> Color;
}

impl ColorTheme for log::Level {
    fn color(&self) -> Color {
        use log::Level::*;
        match self {
            Error => Color::BrightRed,
            Warn => Color::BrightYellow,
            Info => Color::Cyan,
            Debug => Color::Magenta,
            Trace => Color::Blue,
        }
    }
}

impl ColorTheme for Verdict {
    fn color(&self) -> Color {
        use Verdict::*;
        if !self::is_truecolor_supported() {
            return match self {
                Correct => Color::Green,
                WrongAnswer => Color::Yellow,
                TimeLimitExceeded => Color::Red,
                RuntimeError => Color::Magenta,
                MemoryLimitExceeded => Color::Blue,
                PolicyViolation => Color::BrightRed,
            };
        }

        let (r, g, b) = match self {
            Correct => (30, 180, 40),
            WrongAnswer => (210, 138, 4),
            TimeLimitExceeded => (220, 42, 42),
            RuntimeError => (171, 40, 200),
            MemoryLimitExceeded => (40, 90, 220),
            PolicyViolation => (240, 20, 110),
        };
        Color::TrueColor { r, g, b }
    }
}

/// Verdict code on a coloured badge, e.g. ` WA `.
pub fn judge_icon(verdict: Verdict) -> ColoredString {
    let fg = if is_truecolor_supported() {
        Color::TrueColor {
            r: 255,
            g: 255,
            b: 255,
        }
    } else {
        Color::BrightBlack
    };
    format!(" {} ", verdict.code())
        .on_color(verdict.color())
        .bold()
        .color(fg)
}

#[cfg(test)]
mod test {
    use strum::IntoEnumIterator;

    use super::*;

    #[test]
    fn judge_icon_carries_code() {
        colored::control::set_override(false);
        for v in Verdict::iter() {
            assert_eq!(judge_icon(v).to_string(), format!(" {} ", v.code()));
        }
    }
}

//! Character classification tables (external collaborator interface).
//!
//! The category and bidirectional tables are not part of this runtime;
//! an embedder supplies them once per process through [`install`]. Until
//! then a conservative ASCII fallback answers, which keeps the core
//! usable and testable stand-alone. The string family only sequences
//! lookups through this interface.

use std::sync::OnceLock;

/// Unicode general category, as the external tables report it.
#[allow(missing_docs)]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Category
{
    Lu, Ll, Lt, Lm, Lo,
    Mn, Me, Mc,
    Nd, Nl, No,
    Zs, Zl, Zp,
    Cc, Cf, Co, Cs, Cn,
    Pd, Ps, Pe, Pc, Po, Pi, Pf,
    Sm, Sc, Sk, So,

    /// Extra spacing controls (TAB, CR, LF and friends).
    Zx,
}

/// Unicode bidirectional category.
#[allow(missing_docs)]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BidiClass
{
    AL, AN, B, BN, CS, EN, ES, ET, FSI, L, LRE, LRI, LRO,
    NSM, ON, PDF, PDI, R, RLE, RLI, RLO, S, WS,
}

/// Classification callbacks supplied by the embedder.
#[derive(Clone, Copy)]
pub struct Tables
{
    /// General category of a code point.
    pub category: fn(char) -> Category,

    /// Bidirectional category of a code point.
    pub bidi: fn(char) -> BidiClass,

    /// Lowercase mapping; identity where none exists.
    pub to_lower: fn(char) -> char,

    /// Uppercase mapping; identity where none exists.
    pub to_upper: fn(char) -> char,
}

static TABLES: OnceLock<Tables> = OnceLock::new();

/// Install the process-wide classification tables.
///
/// Returns `false` if tables were already installed; the first
/// installation wins.
pub fn install(tables: Tables) -> bool
{
    TABLES.set(tables).is_ok()
}

fn tables() -> &'static Tables
{
    TABLES.get().unwrap_or(&ASCII_FALLBACK)
}

/// General category of `ch` per the installed tables.
pub fn category(ch: char) -> Category
{
    (tables().category)(ch)
}

/// Bidirectional category of `ch` per the installed tables.
pub fn bidi(ch: char) -> BidiClass
{
    (tables().bidi)(ch)
}

/// Lowercase mapping of `ch` per the installed tables.
pub fn to_lower(ch: char) -> char
{
    (tables().to_lower)(ch)
}

/// Uppercase mapping of `ch` per the installed tables.
pub fn to_upper(ch: char) -> char
{
    (tables().to_upper)(ch)
}

/* -------------------------------------------------------------------------- */
/*                               ASCII fallback                               */
/* -------------------------------------------------------------------------- */

const ASCII_FALLBACK: Tables = Tables{
    category: ascii_category,
    bidi: ascii_bidi,
    to_lower: ascii_to_lower,
    to_upper: ascii_to_upper,
};

fn ascii_category(ch: char) -> Category
{
    match ch {
        'A' ..= 'Z' => Category::Lu,
        'a' ..= 'z' => Category::Ll,
        '0' ..= '9' => Category::Nd,
        ' ' => Category::Zs,
        '\t' | '\n' | '\r' | '\x0b' | '\x0c' => Category::Zx,
        '(' | '[' | '{' => Category::Ps,
        ')' | ']' | '}' => Category::Pe,
        '-' => Category::Pd,
        '_' => Category::Pc,
        '$' => Category::Sc,
        '+' | '<' | '=' | '>' | '|' | '~' | '^' | '`' => Category::Sm,
        '!' | '"' | '#' | '%' | '&' | '\'' | '*' | ','
            | '.' | '/' | ':' | ';' | '?' | '@' | '\\' => Category::Po,
        c if (c as u32) < 0x20 || c == '\x7f' => Category::Cc,
        c if c.is_ascii() => Category::Cn,
        _ => Category::Cn,
    }
}

fn ascii_bidi(ch: char) -> BidiClass
{
    match ch {
        '0' ..= '9' => BidiClass::EN,
        'A' ..= 'Z' | 'a' ..= 'z' => BidiClass::L,
        ' ' | '\x0c' => BidiClass::WS,
        '\t' => BidiClass::S,
        '\n' | '\r' => BidiClass::B,
        _ => BidiClass::ON,
    }
}

fn ascii_to_lower(ch: char) -> char
{
    ch.to_ascii_lowercase()
}

fn ascii_to_upper(ch: char) -> char
{
    ch.to_ascii_uppercase()
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn fallback_classifies_ascii()
    {
        assert_eq!(ascii_category('A'), Category::Lu);
        assert_eq!(ascii_category('z'), Category::Ll);
        assert_eq!(ascii_category('7'), Category::Nd);
        assert_eq!(ascii_category(' '), Category::Zs);
        assert_eq!(ascii_category('\t'), Category::Zx);
        assert_eq!(ascii_category('('), Category::Ps);
        assert_eq!(ascii_category('\x01'), Category::Cc);
        assert_eq!(ascii_category('\u{3b1}'), Category::Cn);
    }

    #[test]
    fn fallback_maps_case()
    {
        assert_eq!(ascii_to_lower('Q'), 'q');
        assert_eq!(ascii_to_upper('q'), 'Q');
        assert_eq!(ascii_to_lower('\u{3b1}'), '\u{3b1}');
    }

    #[test]
    fn fallback_bidi_is_left_to_right_for_latin()
    {
        assert_eq!(ascii_bidi('a'), BidiClass::L);
        assert_eq!(ascii_bidi('5'), BidiClass::EN);
        assert_eq!(ascii_bidi('\n'), BidiClass::B);
    }
}

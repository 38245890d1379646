//! The string family.
//!
//! Strings are immutable, length-prefixed buffers of code points sharing
//! one allocation with their reference count. Copying aliases the buffer;
//! nothing ever mutates it in place. Extracting a substring deliberately
//! produces an independently-owned buffer rather than a view, so string
//! descriptors never carry view-lifetime coupling.
//!
//! [`ByteStr`] is the narrow variant used only at interop boundaries; it
//! follows the identical ownership idiom with a nul-terminated byte
//! payload.

use {
    crate::{
        alloc::{self, BLOCK_ALIGN},
        rc::{RefCount, release_raw, retain_raw},
        status::{Error, Result},
        unicode::{self, BidiClass, Category},
    },
    std::{fmt, mem::size_of, ptr::{self, NonNull}, slice},
};

// Payload starts one aligned unit past the count, for every family.
const DATA_OFFSET: usize = BLOCK_ALIGN;

const _: () = assert!(size_of::<RefCount>() <= DATA_OFFSET);

/* -------------------------------------------------------------------------- */
/*                                     Str                                    */
/* -------------------------------------------------------------------------- */

/// A reference-counted, immutable string of code points.
///
/// The all-null descriptor is the valid freed/absent state; releasing it
/// is a no-op. Descriptors of static literals carry a null count and are
/// never freed.
///
/// Strings have no `Drop` impl: generated code owns every release site
/// explicitly through [`free`][`Self::free`].
#[repr(C)]
pub struct Str
{
    rc: *mut RefCount,
    data: *const char,
    len: usize,
}

// SAFETY: The payload is immutable and the count is atomic.
unsafe impl Send for Str { }
unsafe impl Sync for Str { }

impl Str
{
    /// The absent string; release is a no-op.
    pub const fn null() -> Self
    {
        Self{rc: ptr::null_mut(), data: ptr::null(), len: 0}
    }

    /// Create a string by copying `chars` into one fresh allocation.
    ///
    /// An empty input still yields a valid, owned, zero-length string,
    /// never the null descriptor.
    pub fn make(chars: &[char]) -> Result<Self>
    {
        let (rc, data) = alloc_payload(chars.len())?;
        // SAFETY: The payload area spans chars.len() code points.
        unsafe {
            ptr::copy_nonoverlapping(chars.as_ptr(), data, chars.len());
        }
        Ok(Self{rc: rc.as_ptr(), data, len: chars.len()})
    }

    /// Wrap a static literal; the descriptor carries no count.
    pub const fn from_static(chars: &'static [char]) -> Self
    {
        Self{rc: ptr::null_mut(), data: chars.as_ptr(), len: chars.len()}
    }

    /// Convenience constructor from Rust text.
    pub fn from_str(text: &str) -> Result<Self>
    {
        let chars: Vec<char> = text.chars().collect();
        Self::make(&chars)
    }

    /// Copy the string: retain and alias, never touching the payload.
    pub fn copy(&self) -> Self
    {
        // SAFETY: A null count is a defined no-op.
        unsafe { retain_raw(self.rc); }
        Self{rc: self.rc, data: self.data, len: self.len}
    }

    /// Release the string and null the descriptor.
    ///
    /// Safe on the null descriptor and on static literals.
    pub fn free(&mut self)
    {
        // SAFETY: A non-null count heads a live allocation we co-own.
        if unsafe { release_raw(self.rc) } == 1 {
            // SAFETY: We were the last owner of a made string.
            unsafe { alloc::free_block(NonNull::new_unchecked(self.rc).cast()); }
        }
        *self = Self::null();
    }

    /// The number of code points.
    pub fn len(&self) -> usize
    {
        self.len
    }

    /// Whether the string is empty.
    pub fn is_empty(&self) -> bool
    {
        self.len == 0
    }

    /// The code points.
    pub fn chars(&self) -> &[char]
    {
        if self.len == 0 {
            return &[];
        }
        // SAFETY: A non-empty descriptor points at len live code points.
        unsafe { slice::from_raw_parts(self.data, self.len) }
    }

    /// Extract `[start, end)` as a new, independently-owned string.
    ///
    /// This is a deep copy by design, not a view.
    pub fn substr(&self, start: isize, end: isize) -> Result<Self>
    {
        if start < 0 || start > end || end as usize > self.len {
            return Err(Error::OutOfRange);
        }
        Self::make(&self.chars()[start as usize .. end as usize])
    }

    /// Join `parts` with `sep` between them.
    ///
    /// Sizes in one pass, allocates exactly once, fills in one pass.
    /// No parts yields a valid empty string.
    pub fn join(parts: &[Str], sep: &Str) -> Result<Self>
    {
        let mut total = sep.len.checked_mul(parts.len().saturating_sub(1))
            .ok_or(Error::Size)?;
        for part in parts {
            total = total.checked_add(part.len).ok_or(Error::Size)?;
        }

        let (rc, data) = alloc_payload(total)?;
        let mut at = data;
        for (i, part) in parts.iter().enumerate() {
            // SAFETY: The fill stays within the sized payload area; the
            // null descriptor contributes nothing.
            unsafe {
                if i > 0 && sep.len > 0 {
                    ptr::copy_nonoverlapping(sep.data, at, sep.len);
                    at = at.add(sep.len);
                }
                if part.len > 0 {
                    ptr::copy_nonoverlapping(part.data, at, part.len);
                    at = at.add(part.len);
                }
            }
        }
        Ok(Self{rc: rc.as_ptr(), data, len: total})
    }

    /// Encode as UTF-8 into a narrow interop string.
    pub fn to_utf8(&self) -> Result<ByteStr>
    {
        let total = self.chars().iter()
            .map(|ch| ch.len_utf8())
            .sum::<usize>();

        let (rc, data) = alloc_byte_payload(total)?;
        let mut at = 0;
        for &ch in self.chars() {
            let mut buf = [0u8; 4];
            let encoded = ch.encode_utf8(&mut buf).as_bytes();
            // SAFETY: The fill stays within the sized payload area.
            unsafe {
                ptr::copy_nonoverlapping(
                    encoded.as_ptr(), data.add(at), encoded.len());
            }
            at += encoded.len();
        }
        Ok(ByteStr{rc: rc.as_ptr(), data, len: total})
    }

    /// Decode UTF-8 bytes into a string.
    ///
    /// Malformed input is a [`BadEncoding`][`Error::BadEncoding`]
    /// failure, never a lossy decode.
    pub fn from_utf8(bytes: &[u8]) -> Result<Self>
    {
        let text = std::str::from_utf8(bytes)
            .map_err(|_| Error::BadEncoding)?;
        Self::from_str(text)
    }

    /// Decode strict 7-bit input into a string.
    pub fn from_ascii(bytes: &[u8]) -> Result<Self>
    {
        if !bytes.is_ascii() {
            return Err(Error::BadEncoding);
        }
        let chars: Vec<char> = bytes.iter().map(|&b| b as char).collect();
        Self::make(&chars)
    }

    /// Parse an integer in the given base (2 to 36).
    ///
    /// Surrounding whitespace is permitted. Text that is not a number in
    /// the base, or that overflows, is `Ok(None)` rather than a failure:
    /// unparseable input is an answer, not an error.
    pub fn parse_int(&self, base: u32) -> Result<Option<isize>>
    {
        if !(2 ..= 36).contains(&base) {
            return Err(Error::Size);
        }

        let chars = self.chars();
        let mut at = 0;
        while at < chars.len() && is_space(chars[at]) {
            at += 1;
        }

        let mut negative = false;
        if at < chars.len() && matches!(chars[at], '-' | '+') {
            negative = chars[at] == '-';
            at += 1;
        }

        let digits_start = at;
        let mut value = 0isize;
        while at < chars.len() {
            let digit = match to_digit(chars[at]) {
                Some(d) if d < base => d,
                _ => break,
            };
            value = match value.checked_mul(base as isize)
                .and_then(|v| v.checked_add(digit as isize))
            {
                Some(v) => v,
                None => return Ok(None),
            };
            at += 1;
        }
        if at == digits_start {
            return Ok(None);
        }

        while at < chars.len() && is_space(chars[at]) {
            at += 1;
        }
        if at != chars.len() {
            return Ok(None);
        }

        Ok(Some(if negative { -value } else { value }))
    }

    /// The content as Rust text.
    pub fn to_std_string(&self) -> String
    {
        self.chars().iter().collect()
    }

    #[cfg(test)]
    fn count(&self) -> Option<isize>
    {
        // SAFETY: A non-null count heads a live allocation we co-own.
        unsafe { self.rc.as_ref().map(RefCount::load) }
    }
}

impl fmt::Debug for Str
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result
    {
        write!(f, "\"{}\"", self.to_std_string().escape_debug())
    }
}

/* -------------------------------------------------------------------------- */
/*                                   ByteStr                                  */
/* -------------------------------------------------------------------------- */

/// A reference-counted byte string for interop boundaries.
///
/// The payload is nul-terminated (the nul is not counted in `len`), so
/// the data pointer can be handed to foreign code expecting C strings.
#[repr(C)]
pub struct ByteStr
{
    rc: *mut RefCount,
    data: *const u8,
    len: usize,
}

// SAFETY: The payload is immutable and the count is atomic.
unsafe impl Send for ByteStr { }
unsafe impl Sync for ByteStr { }

impl ByteStr
{
    /// The absent byte string; release is a no-op.
    pub const fn null() -> Self
    {
        Self{rc: ptr::null_mut(), data: ptr::null(), len: 0}
    }

    /// Create a byte string by copying `bytes`, appending a nul.
    pub fn make(bytes: &[u8]) -> Result<Self>
    {
        let (rc, data) = alloc_byte_payload(bytes.len())?;
        // SAFETY: The payload area spans len + 1 bytes.
        unsafe {
            ptr::copy_nonoverlapping(bytes.as_ptr(), data, bytes.len());
        }
        Ok(Self{rc: rc.as_ptr(), data, len: bytes.len()})
    }

    /// Copy the byte string: retain and alias.
    pub fn copy(&self) -> Self
    {
        // SAFETY: A null count is a defined no-op.
        unsafe { retain_raw(self.rc); }
        Self{rc: self.rc, data: self.data, len: self.len}
    }

    /// Release the byte string and null the descriptor.
    pub fn free(&mut self)
    {
        // SAFETY: A non-null count heads a live allocation we co-own.
        if unsafe { release_raw(self.rc) } == 1 {
            // SAFETY: We were the last owner.
            unsafe { alloc::free_block(NonNull::new_unchecked(self.rc).cast()); }
        }
        *self = Self::null();
    }

    /// The number of bytes, excluding the terminating nul.
    pub fn len(&self) -> usize
    {
        self.len
    }

    /// Whether the byte string is empty.
    pub fn is_empty(&self) -> bool
    {
        self.len == 0
    }

    /// The bytes, excluding the terminating nul.
    pub fn bytes(&self) -> &[u8]
    {
        if self.data.is_null() {
            return &[];
        }
        // SAFETY: A non-null descriptor points at len + 1 live bytes.
        unsafe { slice::from_raw_parts(self.data, self.len) }
    }

    /// The nul-terminated payload pointer for foreign calls, or null for
    /// the absent byte string.
    pub fn as_c_ptr(&self) -> *const u8
    {
        self.data
    }
}

impl fmt::Debug for ByteStr
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result
    {
        write!(f, "b\"{}\"", self.bytes().escape_ascii())
    }
}

/* -------------------------------------------------------------------------- */
/*                               Classification                               */
/* -------------------------------------------------------------------------- */

/// Whether `ch` is a letter.
pub fn is_alpha(ch: char) -> bool
{
    matches!(
        unicode::category(ch),
        Category::Lu | Category::Ll | Category::Lt
            | Category::Lm | Category::Lo,
    )
}

/// Whether `ch` is an ASCII decimal digit.
pub fn is_digit(ch: char) -> bool
{
    ch.is_ascii_digit()
}

/// Whether `ch` is a decimal digit in any script.
pub fn is_decimal(ch: char) -> bool
{
    unicode::category(ch) == Category::Nd
}

/// Whether `ch` is a letter or decimal digit.
pub fn is_alnum(ch: char) -> bool
{
    is_alpha(ch) || is_decimal(ch)
}

/// Whether `ch` is punctuation or a symbol.
pub fn is_punct(ch: char) -> bool
{
    matches!(
        unicode::category(ch),
        Category::Pd | Category::Ps | Category::Pe | Category::Pc
            | Category::Po | Category::Pi | Category::Pf
            | Category::Sm | Category::Sc | Category::Sk | Category::So,
    )
}

/// Whether `ch` is whitespace.
pub fn is_space(ch: char) -> bool
{
    matches!(
        unicode::category(ch),
        Category::Zs | Category::Zl | Category::Zp | Category::Zx,
    )
}

/// The digit value of `ch` for bases up to 36.
pub fn to_digit(ch: char) -> Option<u32>
{
    match ch {
        '0' ..= '9' => Some(ch as u32 - '0' as u32),
        'a' ..= 'z' => Some(ch as u32 - 'a' as u32 + 10),
        'A' ..= 'Z' => Some(ch as u32 - 'A' as u32 + 10),
        _ => None,
    }
}

/// Lowercase mapping of `ch`.
pub fn to_lower(ch: char) -> char
{
    unicode::to_lower(ch)
}

/// Uppercase mapping of `ch`.
pub fn to_upper(ch: char) -> char
{
    unicode::to_upper(ch)
}

/// Bidirectional category of `ch`.
pub fn bidi_class(ch: char) -> BidiClass
{
    unicode::bidi(ch)
}

/* -------------------------------------------------------------------------- */
/*                                 Allocation                                 */
/* -------------------------------------------------------------------------- */

fn alloc_payload(len: usize) -> Result<(NonNull<RefCount>, *mut char)>
{
    let bytes = len.checked_mul(size_of::<char>())
        .and_then(|b| b.checked_add(DATA_OFFSET))
        .ok_or(Error::Size)?;

    let block = alloc::alloc_block(bytes)?;
    let rc = block.cast::<RefCount>();
    // SAFETY: The block is fresh and at least DATA_OFFSET bytes.
    unsafe {
        rc.as_ptr().write(RefCount::new(1));
        Ok((rc, block.as_ptr().add(DATA_OFFSET).cast::<char>()))
    }
}

fn alloc_byte_payload(len: usize) -> Result<(NonNull<RefCount>, *mut u8)>
{
    let bytes = len.checked_add(DATA_OFFSET + 1).ok_or(Error::Size)?;

    let block = alloc::alloc_block(bytes)?;
    let rc = block.cast::<RefCount>();
    // SAFETY: The block is fresh and spans the payload plus the nul.
    unsafe {
        rc.as_ptr().write(RefCount::new(1));
        let data = block.as_ptr().add(DATA_OFFSET);
        *data.add(len) = 0;
        Ok((rc, data))
    }
}

#[cfg(test)]
mod tests
{
    use {super::*, proptest::proptest};

    fn s(text: &str) -> Str
    {
        Str::from_str(text).unwrap()
    }

    #[test]
    fn copy_aliases_and_free_releases()
    {
        let mut a = s("shared");
        let mut b = a.copy();
        assert_eq!(a.count(), Some(2));
        assert_eq!(a.data, b.data);

        a.free();
        assert_eq!(b.count(), Some(1));
        assert_eq!(b.to_std_string(), "shared");
        b.free();
    }

    #[test]
    fn free_is_idempotent_on_the_null_descriptor()
    {
        let mut empty = Str::null();
        empty.free();
        empty.free();
        assert!(empty.is_empty());

        let mut narrow = ByteStr::null();
        narrow.free();
        narrow.free();
    }

    #[test]
    fn empty_make_is_valid_and_owned()
    {
        let mut empty = Str::make(&[]).unwrap();
        assert!(!empty.rc.is_null());
        assert_eq!(empty.len(), 0);
        empty.free();
    }

    #[test]
    fn static_literals_are_never_freed()
    {
        static HI: [char; 2] = ['h', 'i'];
        let mut lit = Str::from_static(&HI);
        let mut alias = lit.copy();
        assert_eq!(lit.count(), None);
        lit.free();
        assert_eq!(alias.to_std_string(), "hi");
        alias.free();
    }

    #[test]
    fn substr_is_an_independent_copy()
    {
        let mut parent = s("runtime");
        let mut sub = parent.substr(1, 4).unwrap();
        parent.free();
        assert_eq!(sub.to_std_string(), "unt");
        sub.free();
    }

    #[test]
    fn substr_rejects_out_of_range()
    {
        let mut text = s("abc");
        assert_eq!(text.substr(-1, 2).unwrap_err(), Error::OutOfRange);
        assert_eq!(text.substr(2, 1).unwrap_err(), Error::OutOfRange);
        assert_eq!(text.substr(0, 4).unwrap_err(), Error::OutOfRange);
        text.free();
    }

    #[test]
    fn join_concatenates_with_separators()
    {
        let mut parts = [s("ab"), s("cd"), s("ef")];
        let mut sep = s(",");
        let mut joined = Str::join(&parts, &sep).unwrap();
        assert_eq!(joined.to_std_string(), "ab,cd,ef");

        joined.free();
        sep.free();
        for part in &mut parts {
            part.free();
        }
    }

    #[test]
    fn join_of_nothing_is_a_valid_empty_string()
    {
        let mut sep = s(",");
        let mut joined = Str::join(&[], &sep).unwrap();
        assert!(!joined.rc.is_null());
        assert_eq!(joined.len(), 0);
        joined.free();
        sep.free();
    }

    #[test]
    fn utf8_round_trips_and_rejects_malformed_input()
    {
        let mut text = s("na\u{ef}ve \u{2603}");
        let mut narrow = text.to_utf8().unwrap();
        let mut back = Str::from_utf8(narrow.bytes()).unwrap();
        assert_eq!(back.to_std_string(), "na\u{ef}ve \u{2603}");

        assert_eq!(
            Str::from_utf8(&[0xff, 0xfe]).unwrap_err(),
            Error::BadEncoding,
        );

        text.free();
        narrow.free();
        back.free();
    }

    #[test]
    fn byte_strings_are_nul_terminated()
    {
        let mut narrow = ByteStr::make(b"abc").unwrap();
        assert_eq!(narrow.len(), 3);
        // SAFETY: The payload spans len + 1 bytes.
        assert_eq!(unsafe { *narrow.as_c_ptr().add(3) }, 0);
        narrow.free();
    }

    #[test]
    fn ascii_decoding_is_strict()
    {
        let mut ok = Str::from_ascii(b"plain").unwrap();
        assert_eq!(ok.to_std_string(), "plain");
        ok.free();

        assert_eq!(
            Str::from_ascii(&[b'a', 0x80]).unwrap_err(),
            Error::BadEncoding,
        );
    }

    #[test]
    fn parse_int_accepts_numbers_and_answers_none_otherwise()
    {
        let cases: &[(&str, u32, Option<isize>)] = &[
            ("42", 10, Some(42)),
            ("  -17 ", 10, Some(-17)),
            ("+8", 10, Some(8)),
            ("ff", 16, Some(255)),
            ("z", 36, Some(35)),
            ("", 10, None),
            ("12x", 10, None),
            ("-", 10, None),
            ("99999999999999999999999999", 10, None),
        ];
        for &(text, base, expected) in cases {
            let mut value = s(text);
            assert_eq!(value.parse_int(base).unwrap(), expected, "{text:?}");
            value.free();
        }

        let mut text = s("1");
        assert_eq!(text.parse_int(1).unwrap_err(), Error::Size);
        text.free();
    }

    #[test]
    fn classification_sequences_the_tables()
    {
        assert!(is_alpha('x'));
        assert!(!is_alpha('4'));
        assert!(is_digit('4'));
        assert!(is_decimal('4'));
        assert!(is_alnum('x') && is_alnum('4'));
        assert!(is_punct(',') && is_punct('+'));
        assert!(is_space(' ') && is_space('\t'));
        assert_eq!(to_digit('f'), Some(15));
        assert_eq!(to_digit('!'), None);
        assert_eq!(to_lower('A'), 'a');
        assert_eq!(to_upper('a'), 'A');
        assert_eq!(bidi_class('a'), BidiClass::L);
    }

    proptest!
    {
        #[test]
        fn substr_matches_slicing(text: String, a in 0usize .. 8, b in 0usize .. 8)
        {
            let chars: Vec<char> = text.chars().collect();
            let (a, b) = (a.min(chars.len()), b.min(chars.len()));
            let (a, b) = (a.min(b), a.max(b));

            let mut whole = Str::make(&chars).unwrap();
            let mut sub = whole.substr(a as isize, b as isize).unwrap();
            assert_eq!(sub.chars(), &chars[a .. b]);
            sub.free();
            whole.free();
        }

        #[test]
        fn join_matches_std(parts: Vec<String>, sep: String)
        {
            let mut strs: Vec<Str> =
                parts.iter().map(|p| s(p)).collect();
            let mut sep_str = s(&sep);

            let mut joined = Str::join(&strs, &sep_str).unwrap();
            assert_eq!(joined.to_std_string(), parts.join(&sep));

            joined.free();
            sep_str.free();
            for part in &mut strs {
                part.free();
            }
        }
    }
}

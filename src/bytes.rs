use logos::Logos;

/// Lex a single Logos token out of a byte slice, requiring that the slice
/// contains nothing else.
pub fn lex<'a, T>(bytes: &'a [u8]) -> Option<T>
where
    T: Logos<'a, Source = [u8]>,
    <T as Logos<'a>>::Extras: Default,
{
    let mut lexer = T::lexer(bytes);
    let token = lexer.next()?.ok()?;
    lexer.remainder().is_empty().then_some(token)
}

/// Parse a byte slice into any `FromStr` type via utf8.
pub fn parse<T: std::str::FromStr>(bytes: &[u8]) -> Option<T> {
    std::str::from_utf8(bytes).ok()?.parse().ok()
}

/// Parse an i64 only if formatting the result reproduces the input exactly:
/// no sign on zero, no leading zeros, no surrounding space. This is the test
/// for storing a string in the integer encoding.
pub fn parse_i64_exact(bytes: &[u8]) -> Option<i64> {
    let (negative, digits) = match bytes {
        [b'0'] => return Some(0),
        [b'-', rest @ ..] => (true, rest),
        rest => (false, rest),
    };

    if !matches!(digits.first(), Some(b'1'..=b'9')) {
        return None;
    }

    digits.iter().try_fold(0i64, |n, byte| {
        if !byte.is_ascii_digit() {
            return None;
        }
        let digit = i64::from(byte - b'0');
        let n = n.checked_mul(10)?;
        if negative {
            n.checked_sub(digit)
        } else {
            n.checked_add(digit)
        }
    })
}

/// The number of bytes in the base 10 rendering of an i64.
pub fn i64_len(n: i64) -> usize {
    let digits = n.unsigned_abs().checked_ilog10().unwrap_or(0) + 1;
    usize::try_from(digits).unwrap_or(1) + usize::from(n < 0)
}

/// Display wrapper for arbitrary bytes: utf8 passes through, everything
/// else is ascii-escaped.
pub struct Output<'a>(pub &'a [u8]);

impl std::fmt::Display for Output<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match std::str::from_utf8(self.0) {
            Ok(s) => write!(f, "{s}"),
            Err(_) => write!(f, "{}", self.0.escape_ascii()),
        }
    }
}

/// Display wrapper rendering a str in ascii uppercase.
pub struct AsciiUpper<'a>(pub &'a str);

impl std::fmt::Display for AsciiUpper<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for c in self.0.chars() {
            write!(f, "{}", c.to_ascii_uppercase())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_integers() {
        assert_eq!(parse_i64_exact(b"0"), Some(0));
        assert_eq!(parse_i64_exact(b"7"), Some(7));
        assert_eq!(parse_i64_exact(b"-7"), Some(-7));
        assert_eq!(parse_i64_exact(b"1200"), Some(1200));
        let max = i64::MAX.to_string();
        assert_eq!(parse_i64_exact(max.as_bytes()), Some(i64::MAX));
        let min = i64::MIN.to_string();
        assert_eq!(parse_i64_exact(min.as_bytes()), Some(i64::MIN));
    }

    #[test]
    fn inexact_integers() {
        assert_eq!(parse_i64_exact(b""), None);
        assert_eq!(parse_i64_exact(b"-"), None);
        assert_eq!(parse_i64_exact(b"-0"), None);
        assert_eq!(parse_i64_exact(b"00"), None);
        assert_eq!(parse_i64_exact(b"042"), None);
        assert_eq!(parse_i64_exact(b" 42"), None);
        assert_eq!(parse_i64_exact(b"42 "), None);
        assert_eq!(parse_i64_exact(b"4 2"), None);
        assert_eq!(parse_i64_exact(b"9223372036854775808"), None);
        assert_eq!(parse_i64_exact(b"-9223372036854775809"), None);
    }

    #[test]
    fn integer_lengths() {
        assert_eq!(i64_len(0), 1);
        assert_eq!(i64_len(9), 1);
        assert_eq!(i64_len(10), 2);
        assert_eq!(i64_len(-10), 3);
        assert_eq!(i64_len(i64::MAX), 19);
        assert_eq!(i64_len(i64::MIN), 20);
    }

    #[test]
    fn lex_whole_slice_only() {
        #[derive(Logos)]
        enum Token {
            #[regex(b"(?i:nx)")]
            Nx,
        }

        assert!(matches!(lex::<Token>(b"NX"), Some(Token::Nx)));
        assert!(lex::<Token>(b"NX extra").is_none());
        assert!(lex::<Token>(b"").is_none());
    }
}

#[cfg(test)]
#[cfg(not(miri))]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn exact_roundtrip(n in any::<i64>()) {
            let text = n.to_string();
            prop_assert_eq!(parse_i64_exact(text.as_bytes()), Some(n));
            prop_assert_eq!(i64_len(n), text.len());
        }

        #[test]
        fn exact_never_reformats(bytes in proptest::collection::vec(any::<u8>(), 0..24)) {
            if let Some(n) = parse_i64_exact(&bytes) {
                prop_assert_eq!(n.to_string().into_bytes(), bytes);
            }
        }
    }
}

//! Iteration over `:`/`;`/`,`-delimited parameter strings.

static DELIMITERS: [char; 3] = [':', ';', ','];

/// Cursor over a command's parameter string.
///
/// Tokens are the runs between `:`, `;` and `,` delimiters. The cursor always
/// yields one final empty token once the text is consumed (so `"a,b"` yields
/// `"a"`, `"b"`, `""`), then reports exhaustion with `None`. This mirrors the
/// wire convention that an absent trailing field and an empty trailing field
/// are the same thing.
pub struct ParamCursor<'a> {
    rest: Option<&'a str>,
}

impl<'a> ParamCursor<'a> {
    pub fn new(param: &'a str) -> Self {
        Self { rest: Some(param) }
    }

    /// Next token, advancing past its delimiter. `None` only after the end
    /// sentinel has been yielded; further calls keep returning `None`.
    pub fn next_str(&mut self) -> Option<&'a str> {
        let rest = self.rest?;
        if rest.is_empty() {
            self.rest = None;
            return Some("");
        }
        match rest.find(DELIMITERS) {
            Some(idx) => {
                self.rest = Some(&rest[idx + 1..]);
                Some(&rest[..idx])
            }
            None => {
                self.rest = Some("");
                Some(rest)
            }
        }
    }

    /// Next token parsed as an integer in `base`.
    ///
    /// The cursor advances past the token even when parsing fails. `None`
    /// covers exhaustion, an empty token, and tokens with trailing
    /// non-numeric characters.
    pub fn next_int(&mut self, base: u32) -> Option<i64> {
        let token = self.next_str()?;
        if token.is_empty() {
            return None;
        }
        i64::from_str_radix(token, base).ok()
    }
}

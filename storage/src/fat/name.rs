//! 8.3 short names.
use super::{FatError, FatResult};
use core::fmt;

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
/// An 11-byte short name: 8 bytes of base name then 3 bytes of extension,
/// both upper-case and space-padded, without the dot.
pub struct ShortName([u8; 11]);

impl ShortName {
    pub const LEN: usize = 11;
    const BASE_LEN: usize = 8;

    /// Characters that cannot appear in a short name.
    const FORBIDDEN: &'static [u8] = b"\"*+,/:;<=>?[\\]|";

    /// Converts a user-facing name such as `readme.txt` or `/README.TXT`
    /// into its on-disk form.
    ///
    /// A single leading `/` is accepted. The name is split on its last dot,
    /// then the base is truncated to 8 characters and the extension to 3.
    /// Earlier dots and spaces are kept as part of the base.
    pub fn normalize(name: &str) -> FatResult<Self> {
        let name = name.strip_prefix('/').unwrap_or(name);
        let Some((base, ext)) = name.rsplit_once('.') else {
            return Err(FatError::InvalidName);
        };
        if base.is_empty()
            || base.starts_with(' ')
            || !base.bytes().chain(ext.bytes()).all(Self::is_valid_char)
        {
            return Err(FatError::InvalidName);
        }

        let mut raw = [b' '; Self::LEN];
        for (dst, src) in raw[..Self::BASE_LEN].iter_mut().zip(base.bytes()) {
            *dst = src.to_ascii_uppercase();
        }
        for (dst, src) in raw[Self::BASE_LEN..].iter_mut().zip(ext.bytes()) {
            *dst = src.to_ascii_uppercase();
        }

        Ok(Self(raw))
    }

    #[must_use]
    #[inline]
    const fn is_valid_char(c: u8) -> bool {
        if c != b' ' && !c.is_ascii_graphic() {
            return false;
        }
        let mut i = 0;
        while i < Self::FORBIDDEN.len() {
            if Self::FORBIDDEN[i] == c {
                return false;
            }
            i += 1;
        }
        true
    }

    #[must_use]
    #[inline]
    /// Wraps raw name bytes read from a directory entry.
    pub const fn from_raw(raw: [u8; 11]) -> Self {
        Self(raw)
    }

    #[must_use]
    #[inline]
    pub const fn as_bytes(&self) -> &[u8; 11] {
        &self.0
    }

    #[must_use]
    #[inline]
    pub fn base(&self) -> &[u8] {
        self.0[..Self::BASE_LEN].trim_ascii_end()
    }

    #[must_use]
    #[inline]
    pub fn extension(&self) -> &[u8] {
        self.0[Self::BASE_LEN..].trim_ascii_end()
    }
}

impl fmt::Display for ShortName {
    /// Formats the name as `BASE.EXT`, or `BASE` when there is no extension.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for &c in self.base() {
            write!(f, "{}", char::from(c))?;
        }
        let ext = self.extension();
        if !ext.is_empty() {
            f.write_str(".")?;
            for &c in ext {
                write!(f, "{}", char::from(c))?;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for ShortName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ShortName(\"{}\")", self.0.escape_ascii())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize() {
        assert_eq!(
            ShortName::normalize("readme.txt").unwrap().as_bytes(),
            b"README  TXT"
        );
        assert_eq!(
            ShortName::normalize("/KERNEL.BIN").unwrap().as_bytes(),
            b"KERNEL  BIN"
        );
        assert_eq!(ShortName::normalize("a.b").unwrap().as_bytes(), b"A       B  ");
        assert_eq!(
            ShortName::normalize("Makefile.").unwrap().as_bytes(),
            b"MAKEFILE   "
        );
    }

    #[test]
    fn test_split_on_last_dot() {
        assert_eq!(
            ShortName::normalize("a.b.txt").unwrap().as_bytes(),
            b"A.B     TXT"
        );
        assert_eq!(
            ShortName::normalize("my file.txt").unwrap().as_bytes(),
            b"MY FILE TXT"
        );
        assert_eq!(
            ShortName::normalize("archive.tar.gz").unwrap().as_bytes(),
            b"ARCHIVE.GZ "
        );
        assert_eq!(ShortName::normalize("a..b").unwrap().as_bytes(), b"A.      B  ");
    }

    #[test]
    fn test_truncation() {
        assert_eq!(
            ShortName::normalize("verylongname.text").unwrap().as_bytes(),
            b"VERYLONGTEX"
        );
        assert_eq!(
            ShortName::normalize("verylongname.text").unwrap(),
            ShortName::normalize("VERYLONGXX.TEXTS").unwrap()
        );
    }

    #[test]
    fn test_invalid_names() {
        for name in [
            "",
            "README",
            ".txt",
            "/",
            "//a.txt",
            "dir/a.txt",
            "dir\\a.txt",
            "a*.txt",
            "a.t?t",
            " a.txt",
            "caf\u{e9}.txt",
            "tab\t.txt",
        ] {
            assert_eq!(
                ShortName::normalize(name),
                Err(FatError::InvalidName),
                "{name:?}"
            );
        }
    }

    #[test]
    fn test_display() {
        assert_eq!(
            ShortName::normalize("readme.txt").unwrap().to_string(),
            "README.TXT"
        );
        assert_eq!(ShortName::from_raw(*b"NOEXT      ").to_string(), "NOEXT");
        assert_eq!(
            format!("{:?}", ShortName::from_raw(*b"A       B  ")),
            "ShortName(\"A       B  \")"
        );
    }
}

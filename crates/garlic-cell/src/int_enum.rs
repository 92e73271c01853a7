//! A small local stand-in for the `caret_int!` pattern: declare a
//! newtype over an integer with some named values, while still
//! accepting (and round-tripping) values that have no name.
//!
//! Tor's cell and relay-cell commands are exactly this shape: an 8-bit
//! integer where some values are defined by the protocol and the rest
//! must still decode (and re-encode) losslessly as "unrecognized".

/// Declare an integer newtype with named constants, `From`/`Into` the
/// underlying integer, and a `Display` impl that prints the name when
/// known.
macro_rules! int_enum {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident($int:ty) {
            $(
                $(#[$cmeta:meta])*
                $cname:ident = $cval:expr
            ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
        $vis struct $name(pub $int);

        #[allow(non_upper_case_globals, missing_docs)]
        impl $name {
            $(
                $(#[$cmeta])*
                pub const $cname: $name = $name($cval);
            )*

            /// Return the name of this value, if it's one of the
            /// ones we recognize.
            pub fn name(&self) -> Option<&'static str> {
                match self.0 {
                    $( $cval => Some(stringify!($cname)), )*
                    _ => None,
                }
            }
        }

        impl From<$int> for $name {
            fn from(v: $int) -> Self {
                $name(v)
            }
        }
        impl From<$name> for $int {
            fn from(v: $name) -> Self {
                v.0
            }
        }
        impl std::fmt::Debug for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                match self.name() {
                    Some(n) => write!(f, "{}({})", n, self.0),
                    None => write!(f, "{}(unrecognized)", self.0),
                }
            }
        }
        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                match self.name() {
                    Some(n) => write!(f, "{}", n),
                    None => write!(f, "Unrecognized({})", self.0),
                }
            }
        }
    };
}

pub(crate) use int_enum;

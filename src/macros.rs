#[cfg(all(feature = "log", not(feature = "defmt")))]
macro_rules! usb_log {
    (trace, $($arg:expr),*) => { log::trace!($($arg),*) };
    (debug, $($arg:expr),*) => { log::debug!($($arg),*) };
}

#[cfg(feature = "defmt")]
macro_rules! usb_log {
    (trace, $($arg:expr),*) => { defmt::trace!($($arg),*) };
    (debug, $($arg:expr),*) => { defmt::debug!($($arg),*) };
}

#[cfg(not(any(feature = "log", feature = "defmt")))]
macro_rules! usb_log {
    ($level:ident, $($arg:expr),*) => {{ $( let _ = $arg; )* }}
}

macro_rules! usb_trace {
    ($($arg:expr),*) => (usb_log!(trace, $($arg),*));
}

macro_rules! usb_debug {
    ($($arg:expr),*) => (usb_log!(debug, $($arg),*));
}

/// Encodes an ASCII string literal as a `&'static [u8]` USB string descriptor at compile time.
///
/// ```
/// use usb_control_core::string_descriptor;
///
/// static PRODUCT: &[u8] = string_descriptor!("ULINK");
///
/// assert_eq!(PRODUCT[0] as usize, PRODUCT.len());
/// assert_eq!(&PRODUCT[2..4], &[b'U', 0]);
/// ```
#[macro_export]
macro_rules! string_descriptor {
    ($s:expr) => {{
        const STRING: &str = $s;
        const DESCRIPTOR: [u8; $crate::descriptor::string_length(STRING)] =
            $crate::descriptor::encode_string(STRING);
        &DESCRIPTOR
    }};
}

/// Encodes a list of LANGIDs as a `&'static [u8]` language descriptor (string index 0) at
/// compile time.
#[macro_export]
macro_rules! language_descriptor {
    ($($lang:expr),+ $(,)?) => {{
        const LANGS: &[u16] = &[$($lang),+];
        const DESCRIPTOR: [u8; $crate::descriptor::language_length(LANGS)] =
            $crate::descriptor::encode_languages(LANGS);
        &DESCRIPTOR
    }};
}

//! # Utility Functions Module
//!
//! Helper per costruire le command line dei tool esterni.

/// Converts any iterable of displayable items to `Vec<String>`.
///
/// # Example
/// ```rust
/// use video_transcoder::utils::to_string_vec;
///
/// let args = to_string_vec(["-loglevel", "error"]);
/// assert_eq!(args, ["-loglevel", "error"]);
/// ```
pub fn to_string_vec<T, I>(items: I) -> Vec<String>
where
    T: ToString,
    I: IntoIterator<Item = T>,
{
    items.into_iter().map(|item| item.to_string()).collect()
}

/// Builds an argument vector from items of mixed displayable types.
///
/// # Example
/// ```rust
/// use video_transcoder::args;
///
/// let bit_rate = 1_500_000;
/// let args = args!["-b:v", bit_rate, "-f", "matroska"];
/// assert_eq!(args, ["-b:v", "1500000", "-f", "matroska"]);
/// ```
#[macro_export]
macro_rules! args {
    [$($item:expr),* $(,)?] => {
        ::std::vec![$(::std::string::ToString::to_string(&$item)),*]
    };
}

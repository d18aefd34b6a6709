use std::borrow::Cow;

use chardetng::EncodingDetector;
use encoding_rs::Encoding;
use tracing::debug;

/// Decode raw markup to UTF-8.
///
/// A byte order mark wins, valid UTF-8 is borrowed as-is, and anything else is
/// decoded with the detector's best guess. Undecodable sequences become U+FFFD.
pub fn decode_markup(bytes: &[u8]) -> Cow<'_, str> {
    if let Some((encoding, bom_len)) = Encoding::for_bom(bytes) {
        let (text, _) = encoding.decode_without_bom_handling(&bytes[bom_len..]);
        return text;
    }

    if let Ok(text) = std::str::from_utf8(bytes) {
        return Cow::Borrowed(text);
    }

    let mut detector = EncodingDetector::new();
    detector.feed(bytes, true);
    let encoding = detector.guess(None, true);
    let (text, _, had_errors) = encoding.decode(bytes);
    debug!(
        encoding = encoding.name(),
        had_errors, "decoded non-UTF-8 markup"
    );
    text
}

//! Escaping of untrusted values placed into search filters.

/// Characters that carry meaning in a filter expression, mapped to their
/// RFC 4515 escape sequences.
const ESCAPE_TABLE: [(char, &str); 5] =
	[('*', "\\2A"), ('(', "\\28"), (')', "\\29"), ('\\', "\\5C"), ('\0', "\\00")];

/// Escape a string so it is safe to substitute into a filter template.
///
/// Every value that originates outside the application (login names,
/// passwords, distinguished names) must pass through here before it is
/// interpolated into a filter.
#[must_use]
pub fn escape_filter(value: &str) -> String {
	if value.is_empty() {
		return String::new();
	}
	let mut escaped = String::with_capacity(value.len());
	for c in value.chars() {
		match ESCAPE_TABLE.iter().find(|(special, _)| *special == c) {
			Some((_, replacement)) => escaped.push_str(replacement),
			None => escaped.push(c),
		}
	}
	escaped
}

/// Escape a raw byte value for use in a filter template.
///
/// Valid UTF-8 is escaped as in [`escape_filter`]. Byte sequences that fail
/// to decode are rendered entirely as two-digit lowercase hex escapes, with
/// no further character-level escaping.
#[must_use]
pub fn escape_filter_bytes(value: &[u8]) -> String {
	match std::str::from_utf8(value) {
		Ok(text) => escape_filter(text),
		Err(_) => {
			let mut escaped = String::with_capacity(value.len() * 3);
			for byte in value {
				escaped.push_str(&format!("\\{byte:02x}"));
			}
			escaped
		}
	}
}

#[cfg(test)]
mod tests {
	#![allow(clippy::unwrap_used)]

	use super::{escape_filter, escape_filter_bytes};

	#[test]
	fn empty_input_is_returned_unchanged() {
		assert_eq!(escape_filter(""), "");
		assert_eq!(escape_filter_bytes(b""), "");
	}

	#[test]
	fn special_characters_are_replaced() {
		assert_eq!(escape_filter("*(uid=admin)\\\0"), "\\2A\\28uid=admin\\29\\5C\\00");
		assert_eq!(escape_filter("(&(cn=*))"), "\\28&\\28cn=\\2A\\29\\29");
	}

	#[test]
	fn plain_text_passes_through() {
		assert_eq!(escape_filter("cn=Jürgen Müller,ou=people"), "cn=Jürgen Müller,ou=people");
	}

	#[test]
	fn no_raw_specials_remain() {
		let escaped = escape_filter("a*b(c)d\\e");
		assert!(!escaped.contains('('));
		assert!(!escaped.contains(')'));
		assert!(!escaped.contains('*'));
		assert_eq!(escaped.matches('\\').count(), 4);
	}

	#[test]
	fn valid_utf8_bytes_use_the_character_table() {
		assert_eq!(escape_filter_bytes(b"user*"), "user\\2A");
	}

	#[test]
	fn invalid_utf8_is_hex_escaped() {
		let bytes = [0x66, 0x6f, 0x6f, 0xff, 0x28, 0x2a];
		let escaped = escape_filter_bytes(&bytes);
		// The hex branch returns immediately, so `(` and `*` stay as plain
		// hex values rather than table escapes.
		assert_eq!(escaped, "\\66\\6f\\6f\\ff\\28\\2a");
	}

	#[test]
	fn hex_escapes_reconstruct_the_original_bytes() {
		let bytes = [0x00, 0x01, 0xfe, 0xff, 0x80];
		let escaped = escape_filter_bytes(&bytes);
		let decoded: Vec<u8> = escaped
			.split('\\')
			.filter(|chunk| !chunk.is_empty())
			.map(|chunk| u8::from_str_radix(chunk, 16).unwrap())
			.collect();
		assert_eq!(decoded, bytes);
	}
}

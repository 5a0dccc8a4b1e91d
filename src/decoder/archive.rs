//! Selects the KML document inside a KMZ archive while the archive is still streaming in.

use crate::fetch::error::FetchError;
use log::debug;
use std::io::{BufRead, BufReader, Read};
use zip::read::read_zipfile_from_stream;

fn is_kml_member(name: &str) -> bool {
    name.to_ascii_lowercase().ends_with(".kml")
}

/// Reads ZIP local entries from `reader` until the first `*.kml` member and hands a
/// buffered reader over its decompressed contents to `decode`.
///
/// Entries before the KML member are skipped without being buffered. Sizes must be
/// recorded in the local headers, which holds for the archives DWD publishes.
///
/// # Errors
///
/// [`FetchError::Archive`] for malformed archives, [`FetchError::MissingMember`] if
/// the archive ends without a KML member, and whatever `decode` returns.
pub fn with_kml_member<R, T>(
    mut reader: R,
    decode: impl FnOnce(&mut dyn BufRead) -> Result<T, FetchError>,
) -> Result<T, FetchError>
where
    R: Read,
{
    while let Some(member) = read_zipfile_from_stream(&mut reader)? {
        if member.is_file() && is_kml_member(member.name()) {
            debug!("Decoding archive member '{}'", member.name());
            return decode(&mut BufReader::new(member));
        }
        debug!("Skipping archive member '{}'", member.name());
    }
    Err(FetchError::MissingMember)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::kmz_with_members;
    use std::io::Cursor;

    fn read_all(reader: &mut dyn BufRead) -> Result<String, FetchError> {
        let mut text = String::new();
        reader.read_to_string(&mut text)?;
        Ok(text)
    }

    #[test]
    fn test_picks_kml_member() {
        let archive = kmz_with_members(&[
            ("README.txt", "not a forecast"),
            ("MOSMIX_L_2024030103_10637.KML", "<kml/>"),
        ]);
        let text = with_kml_member(Cursor::new(archive), read_all).unwrap();
        assert_eq!(text, "<kml/>");
    }

    #[test]
    fn test_missing_member() {
        let archive = kmz_with_members(&[("README.txt", "not a forecast")]);
        assert!(matches!(
            with_kml_member(Cursor::new(archive), read_all),
            Err(FetchError::MissingMember)
        ));
    }

    #[test]
    fn test_not_an_archive() {
        let garbage = b"<html>503 Service Unavailable</html>".to_vec();
        assert!(with_kml_member(Cursor::new(garbage), read_all).is_err());
    }
}

/// IPTC-IIM dataset codec
///
/// An IIM block is a flat run of datasets:
/// `0x1C, record, dataset, length (u16 BE), data`.
/// Lengths with the high bit set are "extended": the low 15 bits give the
/// number of following bytes holding the real length.

/// Tag marker opening every dataset
pub const TAG_MARKER: u8 = 0x1C;

/// Envelope record
pub const RECORD_ENVELOPE: u8 = 1;
/// Application record
pub const RECORD_APPLICATION: u8 = 2;

/// 1:90 Coded Character Set
pub const DS_CODED_CHARSET: u8 = 90;
/// 2:00 Record Version
pub const DS_RECORD_VERSION: u8 = 0;
/// 2:25 Keywords (repeatable)
pub const DS_KEYWORDS: u8 = 25;
/// 2:120 Caption/Abstract
pub const DS_CAPTION: u8 = 120;

/// ISO 2022 escape sequence declaring UTF-8
pub const CHARSET_UTF8: [u8; 3] = [0x1B, 0x25, 0x47];
/// Application record version 4
pub const RECORD_VERSION_4: [u8; 2] = [0x00, 0x04];

const MAX_STANDARD_LENGTH: usize = 0x7FFF;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataSet {
    pub record: u8,
    pub tag: u8,
    pub data: Vec<u8>,
}

impl DataSet {
    pub fn new(record: u8, tag: u8, data: impl Into<Vec<u8>>) -> Self {
        Self {
            record,
            tag,
            data: data.into(),
        }
    }

    pub fn is(&self, record: u8, tag: u8) -> bool {
        self.record == record && self.tag == tag
    }
}

/// Parse an IIM block
pub fn parse(bytes: &[u8]) -> Result<Vec<DataSet>, String> {
    let mut datasets = Vec::new();
    let mut pos = 0;

    while pos < bytes.len() {
        if bytes[pos] != TAG_MARKER {
            // Writers commonly pad the block with zeros
            if bytes[pos..].iter().all(|&b| b == 0) {
                break;
            }
            return Err(format!("Expected IIM tag marker at offset {}", pos));
        }

        let header = bytes
            .get(pos + 1..pos + 5)
            .ok_or_else(|| format!("Truncated IIM header at offset {}", pos))?;
        let record = header[0];
        let tag = header[1];
        let length_field = u16::from_be_bytes([header[2], header[3]]) as usize;
        pos += 5;

        let length = if length_field & 0x8000 != 0 {
            let width = length_field & 0x7FFF;
            if width == 0 || width > 4 {
                return Err(format!(
                    "Unsupported extended length width {} for {}:{}",
                    width, record, tag
                ));
            }
            let raw = bytes
                .get(pos..pos + width)
                .ok_or_else(|| format!("Truncated extended length for {}:{}", record, tag))?;
            pos += width;
            raw.iter().fold(0usize, |acc, &b| (acc << 8) | b as usize)
        } else {
            length_field
        };

        let data = bytes
            .get(pos..pos + length)
            .ok_or_else(|| format!("Dataset {}:{} runs past the end of the block", record, tag))?;
        pos += length;

        datasets.push(DataSet::new(record, tag, data));
    }

    Ok(datasets)
}

/// Serialize datasets in the given order
pub fn serialize(datasets: &[DataSet]) -> Vec<u8> {
    let mut out = Vec::new();

    for ds in datasets {
        out.push(TAG_MARKER);
        out.push(ds.record);
        out.push(ds.tag);

        if ds.data.len() <= MAX_STANDARD_LENGTH {
            out.extend_from_slice(&(ds.data.len() as u16).to_be_bytes());
        } else {
            out.extend_from_slice(&0x8004u16.to_be_bytes());
            out.extend_from_slice(&(ds.data.len() as u32).to_be_bytes());
        }

        out.extend_from_slice(&ds.data);
    }

    out
}

/// Whether the envelope declares UTF-8 text
pub fn declares_utf8(datasets: &[DataSet]) -> bool {
    datasets
        .iter()
        .find(|ds| ds.is(RECORD_ENVELOPE, DS_CODED_CHARSET))
        .map_or(false, |ds| ds.data == CHARSET_UTF8)
}

/// Decode a text dataset
///
/// Undeclared charsets are taken as UTF-8 when the bytes allow it,
/// otherwise as Latin-1, which is what most legacy writers produced.
pub fn decode_text(data: &[u8], utf8: bool) -> String {
    match std::str::from_utf8(data) {
        Ok(text) => text.to_string(),
        Err(_) if utf8 => String::from_utf8_lossy(data).into_owned(),
        Err(_) => data.iter().map(|&b| b as char).collect(),
    }
}

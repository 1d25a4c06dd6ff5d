/// JPEG container handling for the IPTC block
///
/// Only the marker segments before the first SOS are split out; the
/// entropy-coded image data and everything after it is carried through
/// untouched. IPTC lives in an APP13 "Photoshop 3.0" segment as image
/// resource 0x0404.

const MARKER_PREFIX: u8 = 0xFF;
const SOI: u8 = 0xD8;
const EOI: u8 = 0xD9;
const SOS: u8 = 0xDA;
const APP0: u8 = 0xE0;
const APP12: u8 = 0xEC;
const APP13: u8 = 0xED;

const PHOTOSHOP_HEADER: &[u8] = b"Photoshop 3.0\0";
const RESOURCE_SIGNATURE: &[u8; 4] = b"8BIM";
const IPTC_RESOURCE_ID: u16 = 0x0404;

/// Largest payload a single segment can carry (length field counts itself)
pub const MAX_SEGMENT_PAYLOAD: usize = 0xFFFF - 2;

#[derive(Debug, Clone, PartialEq, Eq)]
struct Segment {
    marker: u8,
    payload: Vec<u8>,
}

impl Segment {
    fn is_photoshop(&self) -> bool {
        self.marker == APP13 && self.payload.starts_with(PHOTOSHOP_HEADER)
    }
}

/// A Photoshop image resource block
#[derive(Debug, Clone, PartialEq, Eq)]
struct Resource {
    signature: [u8; 4],
    id: u16,
    /// Pascal string including its length byte and even padding
    name: Vec<u8>,
    data: Vec<u8>,
}

impl Resource {
    fn iptc(data: Vec<u8>) -> Self {
        Self {
            signature: *RESOURCE_SIGNATURE,
            id: IPTC_RESOURCE_ID,
            name: vec![0, 0],
            data,
        }
    }

    fn is_iptc(&self) -> bool {
        &self.signature == RESOURCE_SIGNATURE && self.id == IPTC_RESOURCE_ID
    }
}

/// A JPEG split into its header segments and the untouched remainder
#[derive(Debug, Clone)]
pub struct JpegFile {
    segments: Vec<Segment>,
    /// From the SOS (or EOI) marker to the end of file
    tail: Vec<u8>,
}

impl JpegFile {
    /// Split a JPEG file into segments
    pub fn parse(data: &[u8]) -> Result<Self, String> {
        if data.len() < 4 || data[0] != MARKER_PREFIX || data[1] != SOI {
            return Err("Not a JPEG file (missing SOI marker)".to_string());
        }

        let mut segments = Vec::new();
        let mut pos = 2;

        loop {
            if pos >= data.len() {
                return Err("Unexpected end of file before image data".to_string());
            }
            if data[pos] != MARKER_PREFIX {
                return Err(format!("Expected marker at offset {}", pos));
            }

            let marker_start = pos;
            // Any number of 0xFF fill bytes may precede a marker
            while pos < data.len() && data[pos] == MARKER_PREFIX {
                pos += 1;
            }
            let marker = *data
                .get(pos)
                .ok_or_else(|| "Truncated marker".to_string())?;
            pos += 1;

            if marker == SOS || marker == EOI {
                return Ok(Self {
                    segments,
                    tail: data[marker_start..].to_vec(),
                });
            }
            if marker == 0x01 || (0xD0..=0xD7).contains(&marker) || marker == SOI {
                return Err(format!("Unexpected standalone marker 0x{:02X}", marker));
            }

            let length = data
                .get(pos..pos + 2)
                .map(|b| u16::from_be_bytes([b[0], b[1]]) as usize)
                .ok_or_else(|| format!("Truncated length of segment 0x{:02X}", marker))?;
            if length < 2 {
                return Err(format!("Invalid length {} of segment 0x{:02X}", length, marker));
            }
            let payload = data
                .get(pos + 2..pos + length)
                .ok_or_else(|| format!("Segment 0x{:02X} runs past the end of file", marker))?;
            pos += length;

            segments.push(Segment {
                marker,
                payload: payload.to_vec(),
            });
        }
    }

    /// Reassemble the file
    pub fn to_bytes(&self) -> Vec<u8> {
        let size = 2
            + self.segments.iter().map(|s| s.payload.len() + 4).sum::<usize>()
            + self.tail.len();
        let mut out = Vec::with_capacity(size);

        out.extend_from_slice(&[MARKER_PREFIX, SOI]);
        for segment in &self.segments {
            out.extend_from_slice(&[MARKER_PREFIX, segment.marker]);
            out.extend_from_slice(&((segment.payload.len() + 2) as u16).to_be_bytes());
            out.extend_from_slice(&segment.payload);
        }
        out.extend_from_slice(&self.tail);

        out
    }

    /// The raw IIM block, if the file carries one
    pub fn iptc_block(&self) -> Result<Option<Vec<u8>>, String> {
        for segment in self.segments.iter().filter(|s| s.is_photoshop()) {
            let resources = parse_resources(&segment.payload[PHOTOSHOP_HEADER.len()..])?;
            if let Some(resource) = resources.into_iter().find(Resource::is_iptc) {
                return Ok(Some(resource.data));
            }
        }
        Ok(None)
    }

    /// Replace (or add) the IIM block, keeping every other image resource
    pub fn set_iptc_block(&mut self, block: Vec<u8>) -> Result<(), String> {
        let mut block = Some(block);
        let mut rebuilt = Vec::with_capacity(self.segments.len() + 1);

        for segment in &self.segments {
            if !segment.is_photoshop() {
                rebuilt.push(segment.clone());
                continue;
            }

            let mut resources = parse_resources(&segment.payload[PHOTOSHOP_HEADER.len()..])?;
            // The new block goes where the first one was; stale copies elsewhere are dropped
            let position = resources.iter().position(Resource::is_iptc);
            resources.retain(|r| !r.is_iptc());
            if let Some(data) = block.take() {
                let index = position.unwrap_or(resources.len()).min(resources.len());
                resources.insert(index, Resource::iptc(data));
            }

            rebuilt.push(photoshop_segment(&resources)?);
        }

        if let Some(data) = block {
            // Keep JFIF/Exif and friends first, like other writers do
            let index = rebuilt
                .iter()
                .position(|s| !(APP0..=APP12).contains(&s.marker))
                .unwrap_or(rebuilt.len());
            rebuilt.insert(index, photoshop_segment(&[Resource::iptc(data)])?);
        }

        self.segments = rebuilt;
        Ok(())
    }
}

fn photoshop_segment(resources: &[Resource]) -> Result<Segment, String> {
    let mut payload = PHOTOSHOP_HEADER.to_vec();
    payload.extend_from_slice(&serialize_resources(resources));

    if payload.len() > MAX_SEGMENT_PAYLOAD {
        return Err(format!(
            "APP13 segment would be {} bytes, more than the {} a JPEG segment can hold",
            payload.len(),
            MAX_SEGMENT_PAYLOAD
        ));
    }

    Ok(Segment {
        marker: APP13,
        payload,
    })
}

fn parse_resources(bytes: &[u8]) -> Result<Vec<Resource>, String> {
    let mut resources = Vec::new();
    let mut pos = 0;

    while pos < bytes.len() {
        if bytes.len() - pos < 4 && bytes[pos..].iter().all(|&b| b == 0) {
            break;
        }

        let header = bytes
            .get(pos..pos + 6)
            .ok_or_else(|| format!("Truncated image resource at offset {}", pos))?;
        let signature = [header[0], header[1], header[2], header[3]];
        let id = u16::from_be_bytes([header[4], header[5]]);
        pos += 6;

        let name_len = *bytes
            .get(pos)
            .ok_or_else(|| format!("Truncated name of resource 0x{:04X}", id))?
            as usize;
        // Length byte plus characters, padded to an even size
        let name_size = (1 + name_len + 1) & !1;
        let name = bytes
            .get(pos..pos + name_size)
            .ok_or_else(|| format!("Truncated name of resource 0x{:04X}", id))?
            .to_vec();
        pos += name_size;

        let size = bytes
            .get(pos..pos + 4)
            .map(|b| u32::from_be_bytes([b[0], b[1], b[2], b[3]]) as usize)
            .ok_or_else(|| format!("Truncated size of resource 0x{:04X}", id))?;
        pos += 4;

        let data = bytes
            .get(pos..pos + size)
            .ok_or_else(|| format!("Resource 0x{:04X} runs past the end of the segment", id))?
            .to_vec();
        pos += size + (size & 1);

        resources.push(Resource {
            signature,
            id,
            name,
            data,
        });
    }

    Ok(resources)
}

fn serialize_resources(resources: &[Resource]) -> Vec<u8> {
    let mut out = Vec::new();

    for resource in resources {
        out.extend_from_slice(&resource.signature);
        out.extend_from_slice(&resource.id.to_be_bytes());
        out.extend_from_slice(&resource.name);
        out.extend_from_slice(&(resource.data.len() as u32).to_be_bytes());
        out.extend_from_slice(&resource.data);
        if resource.data.len() % 2 == 1 {
            out.push(0);
        }
    }

    out
}

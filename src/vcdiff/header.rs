// VCDIFF file and window headers (RFC 3284 sections 4.1 and 4.2).

use std::io::{self, Read};

use super::decoder::DecodeError;
use super::varint;

pub const VCDIFF_MAGIC: [u8; 4] = [0xD6, 0xC3, 0xC4, 0x00];

// hdr_ind
pub const VCD_SECONDARY: u8 = 1 << 0;
pub const VCD_CODETABLE: u8 = 1 << 1;
pub const VCD_APPHEADER: u8 = 1 << 2;

// win_ind
pub const VCD_SOURCE: u8 = 1 << 0;
pub const VCD_TARGET: u8 = 1 << 1;
pub const VCD_ADLER32: u8 = 1 << 2;

const INVALID_BITS: u8 = !0x07;

/// Largest target window a decoder accepts (xdelta3 XD3_HARDMAXWINSIZE).
pub const HARD_MAX_WINSIZE: u64 = 1 << 24;

/// Largest data, instruction or address section a decoder accepts. An
/// instruction costs at most an opcode, a size and an address.
const MAX_SECTION_LEN: u64 = HARD_MAX_WINSIZE * 16;

/// Largest application header a decoder will buffer.
const MAX_APP_HEADER: usize = 1 << 16;

fn read_byte<R: Read + ?Sized>(r: &mut R) -> io::Result<u8> {
    let mut b = [0u8; 1];
    r.read_exact(&mut b)?;
    Ok(b[0])
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileHeader {
    pub secondary_id: Option<u8>,
    pub app_header: Option<Vec<u8>>,
}

impl FileHeader {
    pub fn write_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&VCDIFF_MAGIC);
        let mut hdr_ind = 0;
        if self.secondary_id.is_some() {
            hdr_ind |= VCD_SECONDARY;
        }
        if self.app_header.is_some() {
            hdr_ind |= VCD_APPHEADER;
        }
        out.push(hdr_ind);
        if let Some(id) = self.secondary_id {
            out.push(id);
        }
        if let Some(app) = &self.app_header {
            varint::push_u64(out, app.len() as u64);
            out.extend_from_slice(app);
        }
    }

    pub fn read_from<R: Read + ?Sized>(r: &mut R) -> Result<Self, DecodeError> {
        let mut magic = [0u8; 4];
        r.read_exact(&mut magic)?;
        if magic[..3] != VCDIFF_MAGIC[..3] {
            return Err(DecodeError::InvalidInput(format!(
                "not a VCDIFF stream (magic {:02X} {:02X} {:02X})",
                magic[0], magic[1], magic[2]
            )));
        }
        if magic[3] != 0 {
            return Err(DecodeError::Unsupported(format!(
                "VCDIFF version {:#04X}",
                magic[3]
            )));
        }

        let hdr_ind = read_byte(r)?;
        if hdr_ind & INVALID_BITS != 0 {
            return Err(DecodeError::InvalidInput(format!(
                "header indicator {hdr_ind:#04X}"
            )));
        }
        let secondary_id = if hdr_ind & VCD_SECONDARY != 0 {
            Some(read_byte(r)?)
        } else {
            None
        };
        if hdr_ind & VCD_CODETABLE != 0 {
            return Err(DecodeError::Unsupported("application code tables".into()));
        }
        let app_header = if hdr_ind & VCD_APPHEADER != 0 {
            let len = varint::stream_read_usize(r)?;
            if len > MAX_APP_HEADER {
                return Err(DecodeError::InvalidInput(format!(
                    "application header of {len} bytes"
                )));
            }
            let mut data = vec![0u8; len];
            r.read_exact(&mut data)?;
            Some(data)
        } else {
            None
        };

        Ok(Self {
            secondary_id,
            app_header,
        })
    }
}

/// Segment of earlier data that COPY instructions may address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CopyWindow {
    pub len: u64,
    pub offset: u64,
    /// The segment comes from previously decoded target, not the source.
    pub from_target: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WindowHeader {
    pub copy_window: Option<CopyWindow>,
    pub target_window_len: u64,
    pub del_ind: u8,
    pub data_len: u64,
    pub inst_len: u64,
    pub addr_len: u64,
    pub adler32: Option<u32>,
}

impl WindowHeader {
    fn win_ind(&self) -> u8 {
        let mut ind = match self.copy_window {
            Some(w) if w.from_target => VCD_TARGET,
            Some(_) => VCD_SOURCE,
            None => 0,
        };
        if self.adler32.is_some() {
            ind |= VCD_ADLER32;
        }
        ind
    }

    /// Value of the redundant "length of the delta encoding" field, or
    /// `None` if it does not fit in a `u64`.
    pub fn enc_len(&self) -> Option<u64> {
        let fields = [
            self.target_window_len,
            self.data_len,
            self.inst_len,
            self.addr_len,
        ];
        let varints: u64 = fields.iter().map(|&v| varint::sizeof_u64(v) as u64).sum();
        let checksum = if self.adler32.is_some() { 4 } else { 0 };
        [self.data_len, self.inst_len, self.addr_len, checksum]
            .into_iter()
            .try_fold(varints + 1, u64::checked_add)
    }

    pub fn write_to(&self, out: &mut Vec<u8>) {
        out.push(self.win_ind());
        if let Some(w) = self.copy_window {
            varint::push_u64(out, w.len);
            varint::push_u64(out, w.offset);
        }
        // Encoder windows stay under MAX_WINDOW_SIZE.
        varint::push_u64(out, self.enc_len().unwrap_or(u64::MAX));
        varint::push_u64(out, self.target_window_len);
        out.push(self.del_ind);
        varint::push_u64(out, self.data_len);
        varint::push_u64(out, self.inst_len);
        varint::push_u64(out, self.addr_len);
        if let Some(sum) = self.adler32 {
            out.extend_from_slice(&sum.to_be_bytes());
        }
    }

    /// Read the next window header; `Ok(None)` at a clean end of stream.
    pub fn read_from<R: Read + ?Sized>(r: &mut R) -> Result<Option<Self>, DecodeError> {
        let mut first = [0u8; 1];
        let win_ind = loop {
            match r.read(&mut first) {
                Ok(0) => return Ok(None),
                Ok(_) => break first[0],
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        };
        if win_ind & INVALID_BITS != 0 {
            return Err(DecodeError::InvalidInput(format!(
                "window indicator {win_ind:#04X}"
            )));
        }
        let copy_window = match win_ind & (VCD_SOURCE | VCD_TARGET) {
            0 => None,
            VCD_SOURCE | VCD_TARGET => {
                let len = varint::stream_read_u64(r)?;
                let offset = varint::stream_read_u64(r)?;
                if len.checked_add(offset).is_none() {
                    return Err(DecodeError::InvalidInput(format!(
                        "copy window of {len} bytes at {offset} overflows"
                    )));
                }
                Some(CopyWindow {
                    len,
                    offset,
                    from_target: win_ind & VCD_TARGET != 0,
                })
            }
            _ => {
                return Err(DecodeError::InvalidInput(
                    "window sets both VCD_SOURCE and VCD_TARGET".into(),
                ));
            }
        };

        let enc_len = varint::stream_read_u64(r)?;
        let target_window_len = varint::stream_read_u64(r)?;
        if target_window_len > HARD_MAX_WINSIZE {
            return Err(DecodeError::InvalidInput(format!(
                "target window of {target_window_len} bytes exceeds {HARD_MAX_WINSIZE}"
            )));
        }
        let del_ind = read_byte(r)?;
        let data_len = varint::stream_read_u64(r)?;
        let inst_len = varint::stream_read_u64(r)?;
        let addr_len = varint::stream_read_u64(r)?;
        if let Some(len) = [data_len, inst_len, addr_len]
            .into_iter()
            .find(|&len| len > MAX_SECTION_LEN)
        {
            return Err(DecodeError::InvalidInput(format!(
                "window section of {len} bytes exceeds {MAX_SECTION_LEN}"
            )));
        }
        let adler32 = if win_ind & VCD_ADLER32 != 0 {
            let mut sum = [0u8; 4];
            r.read_exact(&mut sum)?;
            Some(u32::from_be_bytes(sum))
        } else {
            None
        };

        let hdr = Self {
            copy_window,
            target_window_len,
            del_ind,
            data_len,
            inst_len,
            addr_len,
            adler32,
        };
        // Checked before any section is allocated.
        match hdr.enc_len() {
            Some(len) if len == enc_len => {}
            Some(len) => {
                return Err(DecodeError::InvalidInput(format!(
                    "window length field {enc_len} disagrees with sections ({len})"
                )));
            }
            None => {
                return Err(DecodeError::InvalidInput(
                    "window section lengths overflow".into(),
                ));
            }
        }
        Ok(Some(hdr))
    }
}

//! Image collaborators.
//!
//! Boards travel as one byte per cell (`0` dead, `255` alive), `y` outer and
//! `x` inner, under a name derived from the board size (and turn, for output).

use std::{
    collections::HashMap,
    fs,
    io::Write,
    path::{Path, PathBuf},
    sync::Arc,
};

use metrohash::MetroBuildHasher;
use parking_lot::Mutex;
use tracing::debug;

use crate::{Error, Grid, Params, Result};

pub trait Io: Send {
    fn read_image(&mut self, name: &str, width: i32, height: i32) -> Result<Vec<u8>>;

    fn write_image(&mut self, name: &str, width: i32, height: i32, bytes: &[u8]) -> Result<()>;

    /// blocks until every pending write reached its destination.
    fn check_idle(&mut self) -> Result<()>;
}

/// reads the initial board named after the size in `params`.
pub fn load_grid<I: Io + ?Sized>(io: &mut I, params: &Params) -> Result<Grid> {
    let name = params.input_name();
    let bytes = io.read_image(&name, params.width, params.height)?;
    Grid::from_bytes(params.width, params.height, &bytes)
        .ok_or_else(|| Error::image(&name, "pixel count does not match the board size"))
}

/// Binary PGM (`P5`) files, read from `input/<name>.pgm` and written to
/// `output/<name>.pgm`.
#[derive(Debug, Clone)]
pub struct PgmDir {
    input: PathBuf,
    output: PathBuf,
}

impl PgmDir {
    pub fn new(input: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
        }
    }

    fn path(dir: &Path, name: &str) -> PathBuf {
        dir.join(format!("{name}.pgm"))
    }
}

impl Io for PgmDir {
    fn read_image(&mut self, name: &str, width: i32, height: i32) -> Result<Vec<u8>> {
        let path = Self::path(&self.input, name);
        debug!(path = %path.display(), "reading image");
        let content = fs::read(&path)?;
        decode_pgm(name, &content, width, height)
    }

    fn write_image(&mut self, name: &str, width: i32, height: i32, bytes: &[u8]) -> Result<()> {
        fs::create_dir_all(&self.output)?;
        let path = Self::path(&self.output, name);
        debug!(path = %path.display(), "writing image");
        let mut file = fs::File::create(&path)?;
        write!(file, "P5\n{width} {height}\n255\n")?;
        file.write_all(bytes)?;
        file.sync_all()?;
        Ok(())
    }

    fn check_idle(&mut self) -> Result<()> {
        // writes are synchronous and synced on completion.
        Ok(())
    }
}

/// splits a PGM header into its whitespace separated fields, skipping comments.
fn header_fields(content: &[u8], count: usize) -> Option<(Vec<String>, usize)> {
    let mut fields = Vec::with_capacity(count);
    let mut index = 0;
    while fields.len() < count {
        match *content.get(index)? {
            b'#' => {
                while *content.get(index)? != b'\n' {
                    index += 1;
                }
            }
            byte if byte.is_ascii_whitespace() => index += 1,
            _ => {
                let start = index;
                while content.get(index).is_some_and(|b| !b.is_ascii_whitespace()) {
                    index += 1;
                }
                fields.push(String::from_utf8_lossy(&content[start..index]).into_owned());
            }
        }
    }
    // exactly one whitespace byte separates the header from the pixels.
    Some((fields, index + 1))
}

fn decode_pgm(name: &str, content: &[u8], width: i32, height: i32) -> Result<Vec<u8>> {
    let (fields, offset) =
        header_fields(content, 4).ok_or_else(|| Error::image(name, "truncated header"))?;
    if fields[0] != "P5" {
        return Err(Error::image(name, format!("unsupported magic {}", fields[0])));
    }
    let parse = |field: &str| {
        field
            .parse::<i32>()
            .map_err(|_| Error::image(name, format!("invalid header field {field}")))
    };
    let (file_width, file_height) = (parse(&fields[1])?, parse(&fields[2])?);
    if (file_width, file_height) != (width, height) {
        return Err(Error::image(
            name,
            format!("expected {width}x{height}, found {file_width}x{file_height}"),
        ));
    }
    if parse(&fields[3])? > 255 {
        return Err(Error::image(name, "only 8 bit images are supported"));
    }
    let pixels = content
        .get(offset..offset + (width * height) as usize)
        .ok_or_else(|| Error::image(name, "truncated pixel data"))?;
    Ok(pixels.to_vec())
}

/// In-memory images, shared between clones.
#[derive(Debug, Clone, Default)]
pub struct MemoryIo {
    images: Arc<Mutex<HashMap<String, Vec<u8>, MetroBuildHasher>>>,
}

impl MemoryIo {
    pub fn insert(&self, name: impl Into<String>, bytes: Vec<u8>) {
        self.images.lock().insert(name.into(), bytes);
    }

    pub fn insert_grid(&self, params: &Params, grid: &Grid) {
        self.insert(params.input_name(), grid.to_bytes());
    }

    pub fn image(&self, name: &str) -> Option<Vec<u8>> {
        self.images.lock().get(name).cloned()
    }
}

impl Io for MemoryIo {
    fn read_image(&mut self, name: &str, _width: i32, _height: i32) -> Result<Vec<u8>> {
        self.image(name)
            .ok_or_else(|| Error::image(name, "no such image"))
    }

    fn write_image(&mut self, name: &str, _width: i32, _height: i32, bytes: &[u8]) -> Result<()> {
        self.insert(name, bytes.to_vec());
        Ok(())
    }

    fn check_idle(&mut self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pos;

    #[test]
    fn pgm_files_round_trip_through_a_directory() {
        let dir = std::env::temp_dir().join(format!("golrs-dist-pgm-{}", std::process::id()));
        let mut io = PgmDir::new(&dir, &dir);
        let grid = Grid::with_actives(3, 2, [pos!(0, 1), pos!(2, 0)]);
        io.write_image("3x2", 3, 2, &grid.to_bytes()).unwrap();

        let params = Params {
            width: 3,
            height: 2,
            ..Params::default()
        };
        assert_eq!(load_grid(&mut io, &params).unwrap(), grid);
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn pgm_header_comments_are_skipped() {
        let content = b"P5\n# made by hand\n2 1\n255\n\x00\xff";
        assert_eq!(decode_pgm("2x1", content, 2, 1).unwrap(), vec![0, 255]);
    }

    #[test]
    fn pgm_size_mismatch_is_an_error() {
        let content = b"P5\n2 1\n255\n\x00\xff";
        let error = decode_pgm("1x2", content, 1, 2).unwrap_err();
        assert!(matches!(error, Error::Image { .. }));
    }

    #[test]
    fn memory_io_loads_grids() {
        let mut io = MemoryIo::default();
        let params = Params {
            width: 2,
            height: 2,
            ..Params::default()
        };
        assert!(load_grid(&mut io, &params).is_err());
        io.insert("2x2", vec![255, 0, 0, 255]);
        let grid = load_grid(&mut io, &params).unwrap();
        assert_eq!(grid.actives(), vec![pos!(0, 0), pos!(1, 1)]);
    }
}

//! Telemetry recorder: registered fields, per-step snapshots, log I/O.
//!
//! Fields are registered exactly once, before the first snapshot; the row
//! layout is then frozen for the whole run. Each snapshot appends the
//! timestamp (microseconds), the integer section, and the float section.
//! Logs are exposed three ways: in-memory ([`LogData`]), CSV text, and a
//! little-endian binary format that parses back bit-exact.

use exo_types::{Result, SimError};
use hashbrown::HashSet;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

/// Binary log magic and version.
const LOG_MAGIC: &[u8; 6] = b"EXOLOG";
const LOG_VERSION: u16 = 1;

/// A decoded log: header plus column-major-friendly row data.
#[derive(Debug, Clone, PartialEq)]
pub struct LogData {
    /// Column names: `time`, then integer fields, then float fields.
    pub header: Vec<String>,
    /// Snapshot times in seconds (microsecond resolution).
    pub timestamps: Vec<f64>,
    /// Integer section, one row per snapshot.
    pub int_data: Vec<Vec<i32>>,
    /// Float section, one row per snapshot.
    pub float_data: Vec<Vec<f64>>,
}

/// Append-only telemetry recorder with a fixed field set.
#[derive(Debug, Clone, Default)]
pub struct TelemetryRecorder {
    int_fields: Vec<String>,
    float_fields: Vec<String>,
    int_values: Vec<i32>,
    float_values: Vec<f64>,
    names: HashSet<String>,
    locked: bool,

    timestamps_us: Vec<i64>,
    int_rows: Vec<i32>,
    float_rows: Vec<f64>,
}

impl TelemetryRecorder {
    /// An empty recorder accepting registrations.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an integer field; returns its index in the int section.
    pub fn register_int(&mut self, name: impl Into<String>) -> Result<usize> {
        let name = name.into();
        self.check_registration(&name)?;
        self.names.insert(name.clone());
        self.int_fields.push(name);
        self.int_values.push(0);
        Ok(self.int_fields.len() - 1)
    }

    /// Register a float field; returns its index in the float section.
    pub fn register_float(&mut self, name: impl Into<String>) -> Result<usize> {
        let name = name.into();
        self.check_registration(&name)?;
        self.names.insert(name.clone());
        self.float_fields.push(name);
        self.float_values.push(0.0);
        Ok(self.float_fields.len() - 1)
    }

    fn check_registration(&self, name: &str) -> Result<()> {
        if self.locked {
            return Err(SimError::bad_input(format!(
                "cannot register '{name}': telemetry layout is frozen after the first snapshot"
            )));
        }
        if self.names.contains(name) {
            return Err(SimError::bad_input(format!(
                "duplicate telemetry field '{name}'"
            )));
        }
        Ok(())
    }

    /// Number of registered float fields.
    #[must_use]
    pub fn n_float_fields(&self) -> usize {
        self.float_fields.len()
    }

    /// Number of registered integer fields.
    #[must_use]
    pub fn n_int_fields(&self) -> usize {
        self.int_fields.len()
    }

    /// Number of recorded snapshots.
    #[must_use]
    pub fn row_count(&self) -> usize {
        self.timestamps_us.len()
    }

    /// Set an integer value for the next snapshot.
    pub fn set_int(&mut self, index: usize, value: i32) {
        self.int_values[index] = value;
    }

    /// Set a float value for the next snapshot.
    pub fn set_float(&mut self, index: usize, value: f64) {
        self.float_values[index] = value;
    }

    /// Set a contiguous run of float values starting at `start`.
    pub fn set_floats(&mut self, start: usize, values: impl IntoIterator<Item = f64>) {
        for (offset, value) in values.into_iter().enumerate() {
            self.float_values[start + offset] = value;
        }
    }

    /// Append a snapshot of the current values at time `t` (seconds).
    pub fn flush_snapshot(&mut self, t: f64) {
        self.locked = true;
        #[allow(clippy::cast_possible_truncation)]
        self.timestamps_us.push((t * 1e6).round() as i64);
        self.int_rows.extend_from_slice(&self.int_values);
        self.float_rows.extend_from_slice(&self.float_values);
    }

    /// Drop recorded rows, keep the registered layout, reopen registration
    /// until the next snapshot.
    pub fn reset(&mut self) {
        self.timestamps_us.clear();
        self.int_rows.clear();
        self.float_rows.clear();
        self.locked = false;
    }

    /// Header: `time`, integer field names, float field names.
    #[must_use]
    pub fn header(&self) -> Vec<String> {
        let mut header = Vec::with_capacity(1 + self.int_fields.len() + self.float_fields.len());
        header.push("time".to_string());
        header.extend(self.int_fields.iter().cloned());
        header.extend(self.float_fields.iter().cloned());
        header
    }

    /// Decode the recorded rows into a [`LogData`].
    #[must_use]
    pub fn get_log(&self) -> LogData {
        let n_int = self.int_fields.len();
        let n_float = self.float_fields.len();
        let rows = self.timestamps_us.len();
        LogData {
            header: self.header(),
            timestamps: self
                .timestamps_us
                .iter()
                .map(|&us| {
                    #[allow(clippy::cast_precision_loss)]
                    let seconds = us as f64 * 1e-6;
                    seconds
                })
                .collect(),
            int_data: (0..rows)
                .map(|r| self.int_rows[r * n_int..(r + 1) * n_int].to_vec())
                .collect(),
            float_data: (0..rows)
                .map(|r| self.float_rows[r * n_float..(r + 1) * n_float].to_vec())
                .collect(),
        }
    }

    /// Write the tabular log as comma-separated text.
    pub fn write_log_csv(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = std::fs::File::create(path).map_err(io_error)?;
        let mut out = BufWriter::new(file);
        let log = self.get_log();

        writeln!(out, "{}", log.header.join(", ")).map_err(io_error)?;
        for row in 0..log.timestamps.len() {
            write!(out, "{}", log.timestamps[row]).map_err(io_error)?;
            for value in &log.int_data[row] {
                write!(out, ", {value}").map_err(io_error)?;
            }
            for value in &log.float_data[row] {
                write!(out, ", {value}").map_err(io_error)?;
            }
            writeln!(out).map_err(io_error)?;
        }
        out.flush().map_err(io_error)
    }

    /// Write the binary log.
    pub fn write_log_binary(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = std::fs::File::create(path).map_err(io_error)?;
        let mut out = BufWriter::new(file);

        out.write_all(LOG_MAGIC).map_err(io_error)?;
        out.write_all(&LOG_VERSION.to_le_bytes()).map_err(io_error)?;
        write_u32(&mut out, self.int_fields.len())?;
        write_u32(&mut out, self.float_fields.len())?;
        for name in self.int_fields.iter().chain(&self.float_fields) {
            write_u32(&mut out, name.len())?;
            out.write_all(name.as_bytes()).map_err(io_error)?;
        }

        write_u32(&mut out, self.timestamps_us.len())?;
        let n_int = self.int_fields.len();
        let n_float = self.float_fields.len();
        for row in 0..self.timestamps_us.len() {
            out.write_all(&self.timestamps_us[row].to_le_bytes())
                .map_err(io_error)?;
            for value in &self.int_rows[row * n_int..(row + 1) * n_int] {
                out.write_all(&value.to_le_bytes()).map_err(io_error)?;
            }
            for value in &self.float_rows[row * n_float..(row + 1) * n_float] {
                out.write_all(&value.to_le_bytes()).map_err(io_error)?;
            }
        }
        out.flush().map_err(io_error)
    }

    /// Parse a binary log written by [`TelemetryRecorder::write_log_binary`].
    pub fn parse_log_binary(path: impl AsRef<Path>) -> Result<LogData> {
        let file = std::fs::File::open(path).map_err(io_error)?;
        let mut input = BufReader::new(file);

        let mut magic = [0_u8; 6];
        input.read_exact(&mut magic).map_err(io_error)?;
        if &magic != LOG_MAGIC {
            return Err(SimError::bad_input("not a telemetry binary log"));
        }
        let mut version = [0_u8; 2];
        input.read_exact(&mut version).map_err(io_error)?;
        if u16::from_le_bytes(version) != LOG_VERSION {
            return Err(SimError::bad_input(format!(
                "unsupported telemetry log version {}",
                u16::from_le_bytes(version)
            )));
        }

        let n_int = read_u32(&mut input)?;
        let n_float = read_u32(&mut input)?;
        let mut header = Vec::with_capacity(1 + n_int + n_float);
        header.push("time".to_string());
        for _ in 0..n_int + n_float {
            let len = read_u32(&mut input)?;
            let mut buf = vec![0_u8; len];
            input.read_exact(&mut buf).map_err(io_error)?;
            header.push(
                String::from_utf8(buf)
                    .map_err(|_| SimError::bad_input("telemetry field name is not UTF-8"))?,
            );
        }

        let rows = read_u32(&mut input)?;
        let mut timestamps = Vec::with_capacity(rows);
        let mut int_data = Vec::with_capacity(rows);
        let mut float_data = Vec::with_capacity(rows);
        for _ in 0..rows {
            let mut us = [0_u8; 8];
            input.read_exact(&mut us).map_err(io_error)?;
            #[allow(clippy::cast_precision_loss)]
            timestamps.push(i64::from_le_bytes(us) as f64 * 1e-6);

            let mut int_row = Vec::with_capacity(n_int);
            for _ in 0..n_int {
                let mut buf = [0_u8; 4];
                input.read_exact(&mut buf).map_err(io_error)?;
                int_row.push(i32::from_le_bytes(buf));
            }
            int_data.push(int_row);

            let mut float_row = Vec::with_capacity(n_float);
            for _ in 0..n_float {
                let mut buf = [0_u8; 8];
                input.read_exact(&mut buf).map_err(io_error)?;
                float_row.push(f64::from_le_bytes(buf));
            }
            float_data.push(float_row);
        }

        Ok(LogData {
            header,
            timestamps,
            int_data,
            float_data,
        })
    }
}

fn write_u32<W: Write>(out: &mut W, value: usize) -> Result<()> {
    let value = u32::try_from(value)
        .map_err(|_| SimError::bad_input("telemetry log section too large"))?;
    out.write_all(&value.to_le_bytes()).map_err(io_error)
}

fn read_u32<R: Read>(input: &mut R) -> Result<usize> {
    let mut buf = [0_u8; 4];
    input.read_exact(&mut buf).map_err(io_error)?;
    Ok(u32::from_le_bytes(buf) as usize)
}

fn io_error(err: std::io::Error) -> SimError {
    SimError::generic(format!("telemetry I/O failed: {err}"))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn sample_recorder() -> TelemetryRecorder {
        let mut recorder = TelemetryRecorder::new();
        recorder.register_int("iteration").unwrap();
        recorder.register_float("energy").unwrap();
        recorder.register_float("q.link1").unwrap();
        for step in 0..3 {
            recorder.set_int(0, step);
            recorder.set_float(0, f64::from(step) * 0.5);
            recorder.set_float(1, -f64::from(step));
            recorder.flush_snapshot(f64::from(step) * 0.001);
        }
        recorder
    }

    #[test]
    fn test_duplicate_field_rejected() {
        let mut recorder = TelemetryRecorder::new();
        recorder.register_float("energy").unwrap();
        assert!(recorder.register_float("energy").is_err());
        assert!(recorder.register_int("energy").is_err());
    }

    #[test]
    fn test_registration_locks_after_snapshot() {
        let mut recorder = TelemetryRecorder::new();
        recorder.register_float("energy").unwrap();
        recorder.flush_snapshot(0.0);
        assert!(recorder.register_float("late").is_err());
        recorder.reset();
        recorder.register_float("late").unwrap();
    }

    #[test]
    fn test_header_and_rows() {
        let recorder = sample_recorder();
        let log = recorder.get_log();
        assert_eq!(log.header, vec!["time", "iteration", "energy", "q.link1"]);
        assert_eq!(log.timestamps.len(), 3);
        assert_eq!(log.int_data[2], vec![2]);
        assert_eq!(log.float_data[1], vec![0.5, -1.0]);
        assert!((log.timestamps[1] - 0.001).abs() < 1e-12);
    }

    #[test]
    fn test_reset_keeps_layout() {
        let mut recorder = sample_recorder();
        recorder.reset();
        assert_eq!(recorder.row_count(), 0);
        assert_eq!(recorder.n_float_fields(), 2);
        recorder.flush_snapshot(0.0);
        assert_eq!(recorder.row_count(), 1);
    }

    #[test]
    fn test_binary_round_trip() {
        let recorder = sample_recorder();
        let dir = std::env::temp_dir().join("exo-engine-telemetry-test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("roundtrip.log");

        recorder.write_log_binary(&path).unwrap();
        let parsed = TelemetryRecorder::parse_log_binary(&path).unwrap();
        assert_eq!(parsed, recorder.get_log());
    }

    #[test]
    fn test_parse_rejects_garbage() {
        let dir = std::env::temp_dir().join("exo-engine-telemetry-test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("garbage.log");
        std::fs::write(&path, b"definitely not a log").unwrap();
        assert!(TelemetryRecorder::parse_log_binary(&path).is_err());
    }

    #[test]
    fn test_csv_output_shape() {
        let recorder = sample_recorder();
        let dir = std::env::temp_dir().join("exo-engine-telemetry-test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("log.csv");
        recorder.write_log_csv(&path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].starts_with("time, iteration, energy"));
        assert_eq!(lines[1].split(", ").count(), 4);
    }
}

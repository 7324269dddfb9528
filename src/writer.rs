//! Background file writer: drains the render thread's ring buffer into a WAV
//! file on a dedicated thread, so disk I/O never touches the audio callback.
//!
//! Shutdown is a signal-then-join discipline: `stop` sets a cooperative flag
//! and the writer thread keeps draining until the ring reports empty before
//! calling `WavWriter::finalize`, so no buffered audio is lost at the end of
//! a take.

use crate::error::EngineError;
use crate::ring_buffer::RingConsumer;
use hound::{SampleFormat, WavSpec, WavWriter};
use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Handle to a running recording session. Dropping this without calling
/// `stop` leaves the writer thread running until the next `stop` call, since
/// the recording must not be truncated by an unrelated teardown.
pub struct FileWriter {
    stop_flag: Arc<AtomicBool>,
    handle: Option<JoinHandle<Result<(), EngineError>>>,
}

impl FileWriter {
    /// Spawn the writer thread. `sample_rate` and channel count describe the
    /// interleaved stereo stream the render thread is pushing into `consumer`.
    pub fn spawn(
        path: PathBuf,
        sample_rate: u32,
        consumer: RingConsumer,
        idle_sleep: Duration,
    ) -> Result<Self, EngineError> {
        let spec = WavSpec {
            channels: 2,
            sample_rate,
            bits_per_sample: 32,
            sample_format: SampleFormat::Float,
        };

        let file = File::create(&path)?;
        let writer = WavWriter::new(BufWriter::new(file), spec)?;

        let stop_flag = Arc::new(AtomicBool::new(false));
        let stop_flag_thread = Arc::clone(&stop_flag);

        let handle = thread::Builder::new()
            .name("metronome-file-writer".into())
            .spawn(move || Self::run(writer, consumer, stop_flag_thread, idle_sleep))
            .map_err(|e| EngineError::IoError { reason: e.to_string() })?;

        Ok(Self {
            stop_flag,
            handle: Some(handle),
        })
    }

    fn run(
        mut writer: WavWriter<BufWriter<File>>,
        mut consumer: RingConsumer,
        stop_flag: Arc<AtomicBool>,
        idle_sleep: Duration,
    ) -> Result<(), EngineError> {
        let mut scratch = [0.0f32; 4096];
        loop {
            let read = consumer.read_into(&mut scratch);
            for &sample in &scratch[..read] {
                writer.write_sample(sample)?;
            }

            if read == 0 {
                if stop_flag.load(Ordering::Acquire) && consumer.is_empty() {
                    break;
                }
                thread::sleep(idle_sleep);
            }
        }

        writer.finalize()?;
        Ok(())
    }

    /// Signal the writer thread to drain remaining samples and finalize the
    /// file, then join it. Returns the error the writer thread encountered,
    /// if any.
    pub fn stop(mut self) -> Result<(), EngineError> {
        self.stop_flag.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            handle
                .join()
                .unwrap_or_else(|_| Err(EngineError::IoError {
                    reason: "writer thread panicked".to_string(),
                }))
        } else {
            Ok(())
        }
    }
}

impl Drop for FileWriter {
    fn drop(&mut self) {
        self.stop_flag.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ring_buffer::ring_channel;

    #[test]
    fn writes_pushed_samples_and_finalizes_valid_wav() {
        let dir = std::env::temp_dir().join("metronome_writer_test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("take.wav");

        let (mut producer, consumer) = ring_channel(1024);
        let writer = FileWriter::spawn(path.clone(), 48_000, consumer, Duration::from_micros(200))
            .expect("spawn writer");

        for i in 0..200 {
            producer.write((i as f32) / 200.0);
        }
        thread::sleep(Duration::from_millis(50));

        writer.stop().expect("stop writer");

        let reader = hound::WavReader::open(&path).expect("reopen wav");
        assert_eq!(reader.spec().channels, 2);
        assert_eq!(reader.spec().sample_rate, 48_000);
        assert_eq!(reader.len(), 200);

        let _ = std::fs::remove_file(&path);
        let _ = std::fs::remove_dir(&dir);
    }

    #[test]
    fn stop_drains_remaining_samples_before_finalizing() {
        let dir = std::env::temp_dir().join("metronome_writer_drain_test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("take.wav");

        let (mut producer, consumer) = ring_channel(4096);
        let writer = FileWriter::spawn(path.clone(), 48_000, consumer, Duration::from_millis(5))
            .expect("spawn writer");

        for i in 0..1000 {
            producer.write(i as f32);
        }
        // Stop immediately, relying on the drain-before-finalize contract
        // rather than sleeping for the writer to catch up on its own.
        writer.stop().expect("stop writer");

        let reader = hound::WavReader::open(&path).expect("reopen wav");
        assert_eq!(reader.len(), 1000);

        let _ = std::fs::remove_file(&path);
        let _ = std::fs::remove_dir(&dir);
    }
}

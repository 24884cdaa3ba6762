use crate::audio::AudioFrame;
use crate::capability::SpeechToText;
use crate::error::VoiceError;
use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Maximum audio input size for STT (10 MiB). Prevents OOM from oversized payloads.
const MAX_STT_INPUT_BYTES: usize = 10 * 1024 * 1024;

/// Timeout for STT process execution.
const STT_TIMEOUT: Duration = Duration::from_secs(120);

/// Speech-to-text through a whisper.cpp subprocess.
#[derive(Debug, Clone)]
pub struct WhisperStt {
    model_path: PathBuf,
    binary_path: PathBuf,
    language: String,
    timeout: Duration,
}

impl WhisperStt {
    pub fn new(
        model_path: impl Into<PathBuf>,
        binary_path: impl Into<PathBuf>,
        language: impl Into<String>,
    ) -> Self {
        Self {
            model_path: model_path.into(),
            binary_path: binary_path.into(),
            language: language.into(),
            timeout: STT_TIMEOUT,
        }
    }

    /// Overrides how long one transcription may run before it is killed.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Whisper takes ISO 639-1 codes, so `hi-IN` becomes `hi`.
    fn whisper_language(&self) -> &str {
        self.language
            .split(['-', '_'])
            .next()
            .filter(|code| !code.is_empty())
            .unwrap_or("auto")
    }
}

#[async_trait]
impl SpeechToText for WhisperStt {
    async fn transcribe(&self, audio: &AudioFrame) -> Result<String, VoiceError> {
        let audio_data = audio.to_pcm_bytes();
        if audio_data.len() > MAX_STT_INPUT_BYTES {
            return Err(VoiceError::Stt(format!(
                "audio data exceeds maximum size: {} bytes (limit: {} bytes)",
                audio_data.len(),
                MAX_STT_INPUT_BYTES
            )));
        }

        let mut command = Command::new(&self.binary_path);

        // -m <model> -l <lang> -f - : read raw PCM from stdin, plain text on stdout.
        command
            .arg("-m")
            .arg(&self.model_path)
            .arg("-l")
            .arg(self.whisper_language())
            .arg("--no-timestamps")
            .arg("-f")
            .arg("-")
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true);

        let mut child = command
            .spawn()
            .map_err(|e| VoiceError::Stt(format!("Failed to spawn STT binary: {}", e)))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| VoiceError::Stt("Failed to open stdin".to_string()))?;

        // Write from a separate task so a full stdout pipe cannot deadlock us.
        let write_task = tokio::spawn(async move { stdin.write_all(&audio_data).await });

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(output) => {
                output.map_err(|e| VoiceError::Stt(format!("Failed to read stdout: {}", e)))?
            }
            Err(_) => {
                write_task.abort();
                return Err(VoiceError::Stt(format!(
                    "STT process timed out after {} ms",
                    self.timeout.as_millis()
                )));
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(VoiceError::Stt(format!("STT binary failed: {}", stderr)));
        }

        match write_task.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                return Err(VoiceError::Stt(format!(
                    "Failed to write to stdin: {}",
                    e
                )))
            }
            Err(e) => return Err(VoiceError::Stt(format!("Stdin task failed: {}", e))),
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

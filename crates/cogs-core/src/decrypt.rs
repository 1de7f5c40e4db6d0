use crate::CoreError;
use cogs_schema::Format;
use std::io::Write;
use std::process::{Command, Stdio};
use tracing::debug;

/// Opaque decryption capability for encrypted sources.
pub trait Decryptor {
    /// Decrypt `ciphertext` whose plaintext is in `format`.
    fn decrypt(&self, ciphertext: &[u8], format: Format) -> Result<Vec<u8>, CoreError>;
}

/// Decrypts with the `sops` command line tool, feeding ciphertext on stdin.
#[derive(Debug, Clone)]
pub struct SopsDecryptor {
    program: String,
}

impl Default for SopsDecryptor {
    fn default() -> Self {
        Self::new("sops")
    }
}

impl SopsDecryptor {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// The `--input-type`/`--output-type` value sops expects for a format.
    pub fn sops_type(format: Format) -> &'static str {
        match format {
            Format::Json => "json",
            Format::Yaml => "yaml",
            Format::Dotenv => "dotenv",
            Format::Toml | Format::Raw => "binary",
        }
    }
}

impl Decryptor for SopsDecryptor {
    fn decrypt(&self, ciphertext: &[u8], format: Format) -> Result<Vec<u8>, CoreError> {
        let sops_type = Self::sops_type(format);
        debug!("decrypting {} bytes with {} as {sops_type}", ciphertext.len(), self.program);

        let mut child = Command::new(&self.program)
            .args([
                "--decrypt",
                "--input-type",
                sops_type,
                "--output-type",
                sops_type,
                "/dev/stdin",
            ])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| CoreError::Decrypt(format!("failed to run {}: {e}", self.program)))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| CoreError::Decrypt(format!("{} stdin unavailable", self.program)))?;
        let input = ciphertext.to_vec();
        // write from a separate thread so a full stdout pipe cannot stall the child
        let writer = std::thread::spawn(move || stdin.write_all(&input));

        let output = child
            .wait_with_output()
            .map_err(|e| CoreError::Decrypt(format!("{} failed: {e}", self.program)))?;
        match writer.join() {
            Ok(Ok(())) => {}
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::BrokenPipe => {}
            Ok(Err(e)) => {
                return Err(CoreError::Decrypt(format!(
                    "failed to write ciphertext to {}: {e}",
                    self.program
                )))
            }
            Err(_) => {
                return Err(CoreError::Decrypt(format!(
                    "{} stdin writer panicked",
                    self.program
                )))
            }
        }

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(CoreError::Decrypt(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            )));
        }
        Ok(output.stdout)
    }
}

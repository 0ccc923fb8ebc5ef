//! Process-backed signing engine.
//!
//! Command-line contract of the engine executable:
//!
//! ```text
//! <engine> sign    <input> <private-key> <output-signature>
//! <engine> verify  <input> <signature> <public-key>     exit 0 = valid, 1 = invalid
//! <engine> keygen  <algorithm> <prefix>                 writes <prefix>.pub and <prefix>.key
//! ```
//!
//! Signature files use a small sectioned text format:
//!
//! ```text
//! [ALGORITHM]
//! ML-DSA-44
//!
//! [SIGNATURE]
//! <base64>
//! ```

use super::artifact::TempArtifact;
use super::{detect_algorithm, is_supported_algorithm, EngineSignature, KeyPair, SignatureEngine};
use crate::config::EngineConfig;
use crate::digest::{decode_base64, encode_base64};
use crate::error::{Error, Result};
use std::ffi::OsStr;
use std::fs;
use std::io::{self, Read};
use std::process::{Command, ExitStatus, Stdio};
use std::thread::JoinHandle;
use std::time::Instant;
use wait_timeout::ChildExt;

/// Captured result of one engine process.
#[derive(Debug)]
struct ProcessOutput {
    status: ExitStatus,
    stdout: Vec<u8>,
    stderr: Vec<u8>,
}

impl ProcessOutput {
    fn stderr_text(&self) -> String {
        String::from_utf8_lossy(&self.stderr).trim().to_string()
    }
}

/// Parsed signature file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureFile {
    /// Algorithm section, if present
    pub algorithm: Option<String>,
    /// Decoded signature section
    pub signature: Vec<u8>,
}

impl SignatureFile {
    /// Parse the sectioned text format.
    pub fn parse(text: &str) -> Result<Self> {
        #[derive(PartialEq)]
        enum Section {
            None,
            Algorithm,
            Signature,
        }

        let mut section = Section::None;
        let mut algorithm = None;
        let mut base64 = String::new();

        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match line {
                "[ALGORITHM]" => section = Section::Algorithm,
                "[SIGNATURE]" => section = Section::Signature,
                _ if line.starts_with('[') => section = Section::None,
                _ => match section {
                    Section::Algorithm => algorithm = Some(line.to_string()),
                    Section::Signature => base64.push_str(line),
                    Section::None => {},
                },
            }
        }

        if base64.is_empty() {
            return Err(Error::EngineProtocolError(
                "signature file has no [SIGNATURE] section".to_string(),
            ));
        }
        let signature = decode_base64(&base64)
            .map_err(|_| Error::EngineProtocolError("signature file holds invalid base64".to_string()))?;

        Ok(Self {
            algorithm,
            signature,
        })
    }

    /// Render the sectioned text format.
    pub fn render(algorithm: &str, signature: &[u8]) -> String {
        format!("[ALGORITHM]\n{}\n\n[SIGNATURE]\n{}\n", algorithm, encode_base64(signature))
    }
}

/// [`SignatureEngine`] that runs an external executable per call.
#[derive(Debug, Clone)]
pub struct NativeEngine {
    config: EngineConfig,
}

impl NativeEngine {
    /// Create an engine from configuration.
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    /// Engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn work_dir(&self) -> Result<&std::path::Path> {
        fs::create_dir_all(&self.config.work_dir)?;
        Ok(&self.config.work_dir)
    }

    /// Run the executable with a bounded timeout, draining both pipes.
    fn run(&self, args: &[&OsStr]) -> Result<ProcessOutput> {
        let executable = &self.config.executable;
        let command_name = args.first().map(|a| a.to_string_lossy().to_string()).unwrap_or_default();
        log::debug!("Running engine {} {}", executable.display(), command_name);

        let started = Instant::now();
        let mut child = Command::new(executable)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Error::EngineUnavailable(format!("cannot launch {}: {}", executable.display(), e)))?;

        // Pipes are drained on separate threads so a chatty engine cannot
        // block on a full pipe while we wait for it.
        let stdout_reader = child.stdout.take().map(spawn_reader);
        let stderr_reader = child.stderr.take().map(spawn_reader);

        let waited = child.wait_timeout(self.config.timeout);
        let status = match waited {
            Ok(Some(status)) => status,
            Ok(None) => {
                let _ = child.kill();
                let _ = child.wait();
                // Processes the engine forked may still hold the pipes open, so
                // the readers are detached rather than joined.
                drop((stdout_reader, stderr_reader));
                return Err(Error::EngineUnavailable(format!(
                    "{} {} timed out after {}s",
                    executable.display(),
                    command_name,
                    self.config.timeout.as_secs()
                )));
            },
            Err(e) => {
                let _ = child.kill();
                let _ = child.wait();
                drop((stdout_reader, stderr_reader));
                return Err(Error::EngineUnavailable(format!("failed to wait for engine: {}", e)));
            },
        };

        let output = ProcessOutput {
            status,
            stdout: join_reader(stdout_reader),
            stderr: join_reader(stderr_reader),
        };
        log::debug!(
            "Engine {} finished with {} in {}ms",
            command_name,
            output.status,
            started.elapsed().as_millis()
        );
        Ok(output)
    }
}

fn spawn_reader<R: Read + Send + 'static>(mut pipe: R) -> JoinHandle<io::Result<Vec<u8>>> {
    std::thread::spawn(move || {
        let mut buf = Vec::new();
        pipe.read_to_end(&mut buf)?;
        Ok(buf)
    })
}

fn join_reader(handle: Option<JoinHandle<io::Result<Vec<u8>>>>) -> Vec<u8> {
    match handle.map(JoinHandle::join) {
        Some(Ok(Ok(bytes))) => bytes,
        Some(Ok(Err(e))) => {
            log::warn!("Failed to read engine output: {}", e);
            Vec::new()
        },
        Some(Err(_)) => {
            log::warn!("Engine output reader panicked");
            Vec::new()
        },
        None => Vec::new(),
    }
}

fn read_output_file(artifact: &TempArtifact, what: &str) -> Result<Vec<u8>> {
    fs::read(artifact.path()).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => Error::EngineProtocolError(format!("engine did not write the {}", what)),
        _ => Error::Io(e),
    })
}

impl SignatureEngine for NativeEngine {
    fn sign(&self, data: &[u8], private_key: &[u8]) -> Result<EngineSignature> {
        let dir = self.work_dir()?;
        let input = TempArtifact::create(dir, "input", "bin", data)?;
        let key = TempArtifact::create_private(dir, "private", "key", private_key)?;
        let output = TempArtifact::reserve(dir, "signature", "sig");

        let result = self.run(&[
            OsStr::new("sign"),
            input.path().as_os_str(),
            key.path().as_os_str(),
            output.path().as_os_str(),
        ])?;

        if !result.status.success() {
            return Err(Error::EngineProtocolError(format!(
                "sign exited with {}: {}",
                result.status,
                result.stderr_text()
            )));
        }

        let file = read_output_file(&output, "signature file")?;
        let text = String::from_utf8(file)
            .map_err(|_| Error::EngineProtocolError("signature file is not UTF-8".to_string()))?;
        let parsed = SignatureFile::parse(&text)?;

        let algorithm = match parsed.algorithm.or_else(|| detect_algorithm(&result.stdout)) {
            Some(algorithm) => algorithm,
            None => {
                log::warn!(
                    "Engine did not report an algorithm, assuming {}",
                    self.config.default_algorithm
                );
                self.config.default_algorithm.clone()
            },
        };

        log::info!("Engine produced a {} byte {} signature", parsed.signature.len(), algorithm);
        Ok(EngineSignature {
            signature: parsed.signature,
            algorithm,
        })
    }

    fn verify(&self, data: &[u8], signature: &[u8], public_key: &[u8]) -> Result<bool> {
        let algorithm = match detect_algorithm(public_key) {
            Some(algorithm) => algorithm,
            None => {
                log::warn!(
                    "No algorithm found in public key, assuming {}",
                    self.config.default_algorithm
                );
                self.config.default_algorithm.clone()
            },
        };

        let dir = self.work_dir()?;
        let input = TempArtifact::create(dir, "input", "bin", data)?;
        let sig = TempArtifact::create(
            dir,
            "signature",
            "sig",
            SignatureFile::render(&algorithm, signature).as_bytes(),
        )?;
        let key = TempArtifact::create(dir, "public", "pub", public_key)?;

        let result = self.run(&[
            OsStr::new("verify"),
            input.path().as_os_str(),
            sig.path().as_os_str(),
            key.path().as_os_str(),
        ])?;

        match result.status.code() {
            Some(0) => Ok(true),
            Some(1) => {
                log::info!("Engine rejected {} signature", algorithm);
                Ok(false)
            },
            Some(code) => Err(Error::EngineProtocolError(format!(
                "verify exited with status {}: {}",
                code,
                result.stderr_text()
            ))),
            None => Err(Error::EngineProtocolError(format!(
                "verify terminated by signal: {}",
                result.status
            ))),
        }
    }

    fn generate_key_pair(&self, algorithm: &str) -> Result<KeyPair> {
        if !is_supported_algorithm(algorithm) {
            return Err(Error::InvalidInput(format!("unsupported algorithm '{}'", algorithm)));
        }

        let dir = self.work_dir()?;
        let prefix = dir.join(format!("keygen-{}", uuid::Uuid::new_v4()));
        let public = TempArtifact::new(prefix.with_extension("pub"));
        let private = TempArtifact::new(prefix.with_extension("key"));

        let result = self.run(&[OsStr::new("keygen"), OsStr::new(algorithm), prefix.as_os_str()])?;
        if !result.status.success() {
            return Err(Error::EngineProtocolError(format!(
                "keygen exited with {}: {}",
                result.status,
                result.stderr_text()
            )));
        }

        let keys = KeyPair::new(
            read_output_file(&public, "public key")?,
            read_output_file(&private, "private key")?,
        );
        if keys.public_key.is_empty() || keys.private_key.is_empty() {
            return Err(Error::EngineProtocolError("keygen wrote an empty key file".to_string()));
        }

        log::info!("Generated {} key pair", algorithm);
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_signature_file() {
        let parsed = SignatureFile::parse("[ALGORITHM]\nML-DSA-65\n\n[SIGNATURE]\nAAEC\nAwQ=\n").unwrap();
        assert_eq!(parsed.algorithm.as_deref(), Some("ML-DSA-65"));
        assert_eq!(parsed.signature, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_parse_signature_file_crlf_and_unknown_section() {
        let text = "[META]\r\nversion 2\r\n[SIGNATURE]\r\nAAEC\r\n";
        let parsed = SignatureFile::parse(text).unwrap();
        assert_eq!(parsed.algorithm, None);
        assert_eq!(parsed.signature, vec![0, 1, 2]);
    }

    #[test]
    fn test_parse_signature_file_errors() {
        assert!(matches!(
            SignatureFile::parse("[ALGORITHM]\nML-DSA-44\n"),
            Err(Error::EngineProtocolError(_))
        ));
        assert!(matches!(
            SignatureFile::parse("[SIGNATURE]\n!!!\n"),
            Err(Error::EngineProtocolError(_))
        ));
    }

    #[test]
    fn test_render_signature_file() {
        let text = SignatureFile::render("ML-DSA-44", &[0, 1, 2]);
        assert_eq!(text, "[ALGORITHM]\nML-DSA-44\n\n[SIGNATURE]\nAAEC\n");
        assert_eq!(SignatureFile::parse(&text).unwrap().signature, vec![0, 1, 2]);
    }

    #[test]
    fn test_missing_executable_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let engine = NativeEngine::new(
            EngineConfig::new(dir.path().join("no-such-engine")).with_work_dir(dir.path().join("work")),
        );

        let err = engine.sign(b"data", b"key").unwrap_err();
        assert!(matches!(err, Error::EngineUnavailable(_)));
        let leftovers = fs::read_dir(dir.path().join("work")).unwrap().count();
        assert_eq!(leftovers, 0);
    }

    #[test]
    fn test_unsupported_algorithm() {
        let engine = NativeEngine::new(EngineConfig::new("pqc-cli"));
        assert!(matches!(engine.generate_key_pair("RSA-2048"), Err(Error::InvalidInput(_))));
    }
}

//! pqsign command-line front end
//!
//! Usage:
//!   pqsign keygen <signer-id> [algorithm]
//!   pqsign sign <input.pdf> <output.pdf> <signer-id> <signer-name>
//!   pqsign verify <input.pdf>
//!   pqsign chain <input.pdf>
//!
//! Paths and the engine executable come from `PQSIGN_*` environment
//! variables; set `RUST_LOG=debug` for stage-by-stage logging.

use pqsign::chain::ChainCodec;
use pqsign::config::PqSignConfig;
use pqsign::engine::{NativeEngine, SignatureEngine};
use pqsign::keys::KeyStore;
use pqsign::repository::JsonFileRepository;
use pqsign::signing::{SignRequest, SignerIdentity, SigningOrchestrator};
use pqsign::storage::LocalFileStorage;
use pqsign::validation::ValidationEngine;
use std::fs;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

const USAGE: &str = "\
Usage:
  pqsign keygen <signer-id> [algorithm]
  pqsign sign <input.pdf> <output.pdf> <signer-id> <signer-name>
  pqsign verify <input.pdf>
  pqsign chain <input.pdf>";

enum Command {
    Keygen { signer_id: String, algorithm: Option<String> },
    Sign { input: String, output: String, signer_id: String, signer_name: String },
    Verify { input: String },
    Chain { input: String },
}

impl Command {
    fn from_args(args: &[String]) -> Option<Self> {
        let rest: Vec<&str> = args.iter().skip(2).map(String::as_str).collect();
        match (args.get(1).map(String::as_str), rest.as_slice()) {
            (Some("keygen"), [signer_id]) => Some(Command::Keygen {
                signer_id: signer_id.to_string(),
                algorithm: None,
            }),
            (Some("keygen"), [signer_id, algorithm]) => Some(Command::Keygen {
                signer_id: signer_id.to_string(),
                algorithm: Some(algorithm.to_string()),
            }),
            (Some("sign"), [input, output, signer_id, signer_name]) => Some(Command::Sign {
                input: input.to_string(),
                output: output.to_string(),
                signer_id: signer_id.to_string(),
                signer_name: signer_name.to_string(),
            }),
            (Some("verify"), [input]) => Some(Command::Verify {
                input: input.to_string(),
            }),
            (Some("chain"), [input]) => Some(Command::Chain {
                input: input.to_string(),
            }),
            _ => None,
        }
    }
}

struct App {
    config: PqSignConfig,
    engine: Arc<NativeEngine>,
}

impl App {
    fn new(config: PqSignConfig) -> Self {
        let engine = Arc::new(NativeEngine::new(config.engine.clone()));
        Self { config, engine }
    }

    fn keygen(&self, signer_id: &str, algorithm: Option<&str>) -> pqsign::Result<bool> {
        let algorithm = algorithm.unwrap_or(self.config.engine.default_algorithm.as_str());
        let keys = self.engine.generate_key_pair(algorithm)?;
        let store = KeyStore::new(&self.config.key_dir);
        store.save(signer_id, &keys)?;
        println!("Generated {} key pair for {} in {}", algorithm, signer_id, store.root_dir().display());
        Ok(true)
    }

    fn sign(&self, input: &str, output: &str, signer_id: &str, signer_name: &str) -> pqsign::Result<bool> {
        let keys = KeyStore::new(&self.config.key_dir).load(signer_id)?;
        let repository = Arc::new(JsonFileRepository::open(&self.config.repository_file)?);
        let storage = Arc::new(LocalFileStorage::new(&self.config.storage_root)?);
        let orchestrator = SigningOrchestrator::new(self.engine.clone(), repository, storage);

        let document_name = Path::new(input)
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| input.to_string());

        let signed = orchestrator.sign(SignRequest {
            document_name,
            content: fs::read(input)?,
            signer: SignerIdentity::new(signer_id, signer_name),
            keys: &keys,
        })?;
        fs::write(output, &signed.content)?;

        println!(
            "Signed {} -> {} (signature {}, document {}, {})",
            input, output, signed.descriptor.order, signed.descriptor.document_id, signed.descriptor.algorithm
        );
        Ok(true)
    }

    fn verify(&self, input: &str) -> pqsign::Result<bool> {
        let repository = Arc::new(JsonFileRepository::open(&self.config.repository_file)?);
        let storage = Arc::new(LocalFileStorage::new(&self.config.storage_root)?);
        let validator = ValidationEngine::new(self.engine.clone(), repository, storage)
            .with_tolerance(self.config.record_tolerance);

        let report = validator.validate(&fs::read(input)?)?;
        println!("{}: {}", report.status, report.message);
        for check in &report.signatures {
            println!(
                "  #{} {} ({}, {}): {}",
                check.order,
                check.signer_name,
                check.algorithm,
                check.signed_at.to_rfc3339(),
                check.outcome
            );
        }
        Ok(report.is_valid())
    }

    fn chain(&self, input: &str) -> pqsign::Result<bool> {
        let chain = ChainCodec::extract_chain(&fs::read(input)?)?;
        println!("{}", serde_json::to_string_pretty(&chain)?);
        Ok(true)
    }
}

fn main() -> ExitCode {
    env_logger::init();

    let args: Vec<String> = std::env::args().collect();
    let command = match Command::from_args(&args) {
        Some(command) => command,
        None => {
            eprintln!("{}", USAGE);
            return ExitCode::from(2);
        },
    };

    let app = App::new(PqSignConfig::from_env());
    let result = match &command {
        Command::Keygen { signer_id, algorithm } => app.keygen(signer_id, algorithm.as_deref()),
        Command::Sign {
            input,
            output,
            signer_id,
            signer_name,
        } => app.sign(input, output, signer_id, signer_name),
        Command::Verify { input } => app.verify(input),
        Command::Chain { input } => app.chain(input),
    };

    match result {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::from(2)
        },
    }
}

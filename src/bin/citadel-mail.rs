//! Citadel Mail CLI: operational tooling for naked messages
//!
//! Usage:
//!   citadel-mail keygen  --kind <org|user> --name <NAME>
//!   citadel-mail seal    --org-key <KEY> --recipient <SIGNET> --in <FILE> [--out <FILE>]
//!   citadel-mail open    --org-signet <SIGNET> --key <KEY> --in <FILE> [--out <FILE>]
//!   citadel-mail inspect <FILE>

use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use citadel_mail::{inspect, open_naked, EncodeOptions, MessageEnvelope, OrgKey, OrgSignet, UserKey, UserSignet};
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        print_usage();
        return ExitCode::from(1);
    }

    let result = match args[1].as_str() {
        "keygen" => cmd_keygen(&args[2..]),
        "seal" => cmd_seal(&args[2..]),
        "open" => cmd_open(&args[2..]),
        "inspect" => cmd_inspect(&args[2..]),
        "--help" | "-h" => {
            print_usage();
            Ok(())
        }
        "--version" | "-V" => {
            println!("citadel-mail {}", citadel_mail::VERSION);
            Ok(())
        }
        cmd => {
            eprintln!("error: unknown command '{}'", cmd);
            print_usage();
            Err("unknown command".into())
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn print_usage() {
    eprintln!(
        r#"Citadel Mail: signed, chunked, encrypted mail envelopes

USAGE:
    citadel-mail <COMMAND> [OPTIONS]

COMMANDS:
    keygen      Generate an organization or user identity
    seal        Seal a message for a recipient
    open        Verify and decrypt a message
    inspect     Show message layout (no decryption)

EXAMPLES:
    # Identities (writes <NAME>.key and <NAME>.signet)
    citadel-mail keygen --kind org --name example.org
    citadel-mail keygen --kind user --name alice

    # Seal (writes <FILE>.cmail unless --out is given)
    citadel-mail seal \
        --org-key example.org.key \
        --recipient alice.signet \
        --in message.eml

    # Open (writes to stdout unless --out is given)
    citadel-mail open \
        --org-signet example.org.signet \
        --key alice.key \
        --in message.eml.cmail

    # Inspect
    citadel-mail inspect message.eml.cmail

OPTIONS:
    --part-size <BYTES>   Largest body part when sealing (default 1 MiB)
    -h, --help            Print help
    -V, --version         Print version

Set RUST_LOG=citadel_mail=debug to see why a message was rejected.
"#
    );
}

/// Parsed `--flag value` pairs.
struct Options {
    pairs: Vec<(String, String)>,
}

impl Options {
    fn parse(args: &[String], known: &[&str]) -> Result<Self, Box<dyn std::error::Error>> {
        let mut pairs = Vec::new();
        let mut i = 0;
        while i < args.len() {
            let flag = args[i].as_str();
            if !known.contains(&flag) {
                return Err(format!("unknown option: {}", flag).into());
            }
            i += 1;
            let value = args.get(i).ok_or_else(|| format!("missing value for {}", flag))?;
            pairs.push((flag.to_string(), value.clone()));
            i += 1;
        }
        Ok(Self { pairs })
    }

    fn get(&self, flag: &str) -> Option<&str> {
        self.pairs.iter().find(|(f, _)| f == flag).map(|(_, v)| v.as_str())
    }

    fn require(&self, flag: &str) -> Result<&str, Box<dyn std::error::Error>> {
        self.get(flag).ok_or_else(|| format!("missing {}", flag).into())
    }
}

fn read_input(path: Option<&str>) -> io::Result<Vec<u8>> {
    match path {
        Some(path) => fs::read(path),
        None => {
            let mut buf = Vec::new();
            io::stdin().read_to_end(&mut buf)?;
            Ok(buf)
        }
    }
}

fn write_secret(path: &Path, bytes: &[u8]) -> io::Result<()> {
    fs::write(path, bytes)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = fs::metadata(path)?.permissions();
        perms.set_mode(0o600);
        fs::set_permissions(path, perms)?;
    }

    Ok(())
}

fn cmd_keygen(args: &[String]) -> Result<(), Box<dyn std::error::Error>> {
    let opts = Options::parse(args, &["--kind", "--name"])?;
    let kind = opts.require("--kind")?;
    let name = opts.require("--name")?;

    let key_path = PathBuf::from(format!("{}.key", name));
    let signet_path = PathBuf::from(format!("{}.signet", name));

    match kind {
        "org" => {
            let key = OrgKey::generate();
            write_secret(&key_path, &key.to_bytes()[..])?;
            fs::write(&signet_path, key.signet().to_bytes())?;
        }
        "user" => {
            let key = UserKey::generate();
            write_secret(&key_path, &key.to_bytes()[..])?;
            fs::write(&signet_path, key.signet().to_bytes())?;
        }
        other => return Err(format!("unknown key kind '{}' (expected org or user)", other).into()),
    }

    eprintln!("Generated {} identity:", kind);
    eprintln!("  Signet:      {}", signet_path.display());
    eprintln!("  Private key: {} (mode 600)", key_path.display());

    Ok(())
}

fn cmd_seal(args: &[String]) -> Result<(), Box<dyn std::error::Error>> {
    let opts = Options::parse(args, &["--org-key", "--recipient", "--in", "--out", "--part-size"])?;

    let org = OrgKey::from_bytes(&fs::read(opts.require("--org-key")?)?).map_err(|_| "invalid organization key")?;
    let recipient =
        UserSignet::from_bytes(&fs::read(opts.require("--recipient")?)?).map_err(|_| "invalid recipient signet")?;

    let mut options = EncodeOptions::default();
    if let Some(size) = opts.get("--part-size") {
        options = options.with_max_part_size(size.parse()?);
    }

    let input = opts.get("--in");
    let message = read_input(input)?;

    let sealed =
        MessageEnvelope::seal_naked_with(&message, &org, &recipient, &options).map_err(|_| "sealing failed")?;

    let output = match (opts.get("--out"), input) {
        (Some(out), _) => PathBuf::from(out),
        (None, Some(input)) => PathBuf::from(format!("{}.cmail", input)),
        (None, None) => return Err("missing --out when reading from stdin".into()),
    };
    fs::write(&output, sealed.encrypted())?;

    eprintln!(
        "Sealed {} bytes -> {} bytes ({} body parts)",
        message.len(),
        sealed.encrypted().len(),
        sealed.content().body.len()
    );
    eprintln!("Output: {}", output.display());

    Ok(())
}

fn cmd_open(args: &[String]) -> Result<(), Box<dyn std::error::Error>> {
    let opts = Options::parse(args, &["--org-signet", "--key", "--in", "--out"])?;

    let org =
        OrgSignet::from_bytes(&fs::read(opts.require("--org-signet")?)?).map_err(|_| "invalid organization signet")?;
    let key = UserKey::from_bytes(&fs::read(opts.require("--key")?)?).map_err(|_| "invalid user key")?;

    let message = read_input(opts.get("--in"))?;
    let opened = open_naked(&message, &org, &key).map_err(|_| "decryption failed")?;

    if let Some(path) = opts.get("--out") {
        fs::write(path, &opened)?;
        eprintln!("Opened {} bytes -> {} bytes", message.len(), opened.len());
        eprintln!("Output: {}", path);
    } else {
        io::stdout().write_all(&opened)?;
    }

    Ok(())
}

fn cmd_inspect(args: &[String]) -> Result<(), Box<dyn std::error::Error>> {
    let input_path = args.first().ok_or("missing file path")?;
    let message = fs::read(input_path)?;

    let info = inspect(&message).map_err(|_| "invalid message format")?;
    print!("{}", info);

    Ok(())
}

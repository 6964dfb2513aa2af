use std::collections::BTreeMap;
use std::fs;

use anyhow::{anyhow, bail, Context};
use colored::Colorize;
use veil_envelope::{EncryptedStorage, EnvelopeConfig, KEY_ID_METADATA};
use veil_kms::{
    InMemoryKeyService, KeyRequest, PlaintextProfileFile, Profile, ProfileSet, ProfileStore,
};
use veil_store::{BucketInfo, InMemoryStorage, ObjectInfo, ObjectStorage};
use veil_types::{KeyAttributes, ObjectMetadata, ObjectRef};

use crate::cli::*;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Roundtrip(args) => cmd_roundtrip(args, cli.format),
        Command::Profile(args) => cmd_profile(args),
        Command::Config(args) => cmd_config(args),
    }
}

fn cmd_roundtrip(args: RoundtripArgs, format: OutputFormat) -> anyhow::Result<()> {
    let config = match &args.config {
        Some(path) => EnvelopeConfig::from_file(path)
            .with_context(|| format!("loading configuration {}", path.display()))?,
        None => EnvelopeConfig::default(),
    };
    let profile = match &args.profiles {
        Some(path) => PlaintextProfileFile::new(path)
            .load_active()?
            .ok_or_else(|| anyhow!("{} has no active profile", path.display()))?,
        None => Profile::new("local", "https://keys.veil.invalid", "local", "local-credential"),
    };
    let content = match &args.file {
        Some(path) => fs::read(path).with_context(|| format!("reading {}", path.display()))?,
        None => args.content.clone().into_bytes(),
    };
    let attributes = KeyAttributes::from(parse_attributes(&args.attributes)?);
    let metadata: ObjectMetadata = parse_pairs(&args.metadata)?.into_iter().collect();

    let service = InMemoryKeyService::new();
    service.enroll(&profile)?;
    let backing = InMemoryStorage::new();
    backing.create_bucket(BucketInfo::new(args.bucket.as_str()), &[])?;
    let storage = EncryptedStorage::from_config(backing, &config, service.connector())?;
    if args.capture {
        storage.set_metadata_capture(true)?;
    }
    storage.set_profile(profile)?;

    let id = ObjectRef::new(args.bucket.as_str(), args.object.as_str());
    let mut info = ObjectInfo::new(id.clone()).with_content_type("application/octet-stream");
    if !metadata.is_empty() {
        info = info.with_metadata(metadata);
    }
    let request = KeyRequest::new().with_attributes(attributes);
    let created = storage.create_with_key(info, &content, &request, &[])?;
    let key_id = created
        .metadata()
        .and_then(|md| md.get(KEY_ID_METADATA))
        .cloned()
        .unwrap_or_default();

    let (payload, key) = storage.read_all_bytes_and_key(&id, &[])?;
    let key = key.ok_or_else(|| anyhow!("{id} was stored without a key reference"))?;
    let at_rest = storage.inner().stored_payload(&id)?.map_or(0, |p| p.len());
    if payload != content {
        bail!("payload read back from {id} does not match what was written");
    }

    match format {
        OutputFormat::Json => {
            let attributes: BTreeMap<_, _> = key.attributes.iter().collect();
            let report = serde_json::json!({
                "object": id.to_string(),
                "key_id": key_id,
                "size": created.size,
                "stored_size": at_rest,
                "attributes": attributes,
                "verified": true,
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        OutputFormat::Text => {
            println!(
                "{} Stored {} ({} bytes, {} at rest)",
                "✓".green().bold(),
                id.to_string().bold(),
                created.size,
                at_rest
            );
            println!("  Key: {}", key_id.yellow());
            for (name, values) in key.attributes.iter() {
                println!("  Attribute: {} = {}", name.cyan(), values.join(", "));
            }
            println!("{} Read back and verified", "✓".green().bold());
            if args.file.is_none() {
                println!("{}", String::from_utf8_lossy(&payload));
            }
        }
    }
    Ok(())
}

fn cmd_profile(args: ProfileArgs) -> anyhow::Result<()> {
    let file = PlaintextProfileFile::new(&args.file);
    match args.action {
        ProfileAction::List => {
            let set = file.load()?;
            if set.profiles.is_empty() {
                println!("No profiles in {}.", args.file.display());
            }
            for profile in &set.profiles {
                let active = set.active_profile.as_deref() == Some(profile.id.as_str());
                let marker = if active { "*".green().bold() } else { " ".normal() };
                println!(
                    "{} {}  {}  key space {}",
                    marker,
                    profile.id.bold(),
                    profile.server.blue(),
                    profile.key_space
                );
            }
        }
        ProfileAction::Add {
            id,
            server,
            key_space,
            credential,
            activate,
        } => {
            let profile = Profile::new(id, server, key_space, credential);
            profile.validate()?;
            let mut set = if args.file.exists() {
                file.load()?
            } else {
                ProfileSet::default()
            };
            set.profiles.retain(|p| p.id != profile.id);
            if activate {
                set.active_profile = Some(profile.id.clone());
            }
            println!("Added profile {}", profile.id.bold());
            set.profiles.push(profile);
            file.save(&set)?;
        }
        ProfileAction::Activate { id } => {
            let mut set = file.load()?;
            if !set.profiles.iter().any(|p| p.id == id) {
                bail!("no profile {id} in {}", args.file.display());
            }
            println!("Active profile is now {}", id.bold());
            set.active_profile = Some(id);
            file.save(&set)?;
        }
    }
    Ok(())
}

fn cmd_config(args: ConfigArgs) -> anyhow::Result<()> {
    match args.action {
        ConfigAction::Init => print!("{}", EnvelopeConfig::default().to_toml_string()?),
        ConfigAction::Check { path } => {
            let config = EnvelopeConfig::from_file(&path)
                .with_context(|| format!("loading configuration {}", path.display()))?;
            println!("{} {} is valid", "✓".green().bold(), path.display());
            println!("  Session strategy: {:?}", config.session_strategy);
            println!("  Metadata capture: {}", config.metadata_capture);
            println!("  Default attributes: {}", config.default_attributes.len());
            println!("  Client metadata entries: {}", config.client_metadata.len());
        }
    }
    Ok(())
}

/// Split `name=value` arguments. Values may contain `=`.
fn parse_pairs(raw: &[String]) -> anyhow::Result<Vec<(String, String)>> {
    raw.iter()
        .map(|pair| {
            let (name, value) = pair
                .split_once('=')
                .ok_or_else(|| anyhow!("expected name=value, got {pair:?}"))?;
            if name.is_empty() {
                bail!("empty name in {pair:?}");
            }
            Ok((name.to_string(), value.to_string()))
        })
        .collect()
}

fn parse_attributes(raw: &[String]) -> anyhow::Result<BTreeMap<String, Vec<String>>> {
    let mut attributes: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (name, value) in parse_pairs(raw)? {
        attributes.entry(name).or_default().push(value);
    }
    Ok(attributes)
}

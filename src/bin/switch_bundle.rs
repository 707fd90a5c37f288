use anyhow::{anyhow, bail, Context, Result};
use log::{debug, info, LevelFilter};
use serde_json::json;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::process;
use switch_sign_replacer::bundle::{AssetBundle, BundleEntry, MaterialData, PrefabData};
use switch_sign_replacer::config::{ConfigOverrides, ReplacerConfig};
use switch_sign_replacer::host::{ResourceTable, SceneGraph};
use switch_sign_replacer::{MemoryHost, MeshArchiveLoader};

fn main() {
    if let Err(err) = run() {
        eprintln!("switch_bundle error: {err:?}");
        process::exit(1);
    }
}

enum Command {
    Pack { output: PathBuf, inputs: Vec<PathBuf> },
    List { bundle: PathBuf },
    Inspect { bundle: PathBuf },
}

struct CliOptions {
    command: Option<Command>,
    config: Option<PathBuf>,
    verbose: bool,
    json: bool,
    show_help: bool,
}

fn run() -> Result<()> {
    let args: Vec<String> = env::args().skip(1).collect();
    let options = parse_cli_args(&args)?;
    if options.show_help {
        print_usage();
        return Ok(());
    }
    let mut config = match &options.config {
        Some(path) => ReplacerConfig::load(path)?,
        None => ReplacerConfig::default(),
    };
    config.apply_overrides(&ConfigOverrides { verbose: options.verbose.then_some(true), ..Default::default() });
    init_logging(config.debug_logging);

    match options.command {
        Some(Command::Pack { output, inputs }) => pack(&output, &inputs),
        Some(Command::List { bundle }) => list(&bundle, options.json),
        Some(Command::Inspect { bundle }) => inspect(&config, &bundle, options.json),
        None => {
            print_usage();
            Err(anyhow!("missing command"))
        }
    }
}

fn init_logging(verbose: bool) {
    let mut builder = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if verbose {
        builder.filter_level(LevelFilter::Debug);
    }
    builder.init();
}

fn print_usage() {
    eprintln!(
        "Switch Bundle

Usage:
  switch_bundle pack <output> <file> [<file>...]
  switch_bundle list <bundle> [--json]
  switch_bundle inspect <bundle> [--config <path>] [--json]

Options:
  --config <path>   Replacer config (JSON) used for resolution settings
  --verbose         Debug logging
  --json            Machine-readable output

pack stores *.obj files as text entries under assets/, *.mat.json files as
materials and *.prefab.json files as prefabs. inspect runs the custom mesh
resolution order against the bundle and reports what it picks.
"
    );
}

fn parse_cli_args(args: &[String]) -> Result<CliOptions> {
    let mut options = CliOptions { command: None, config: None, verbose: false, json: false, show_help: false };
    let mut positional = Vec::new();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" => {
                let value = iter.next().ok_or_else(|| anyhow!("--config requires a path"))?;
                options.config = Some(PathBuf::from(value));
            }
            "--verbose" | "-v" => options.verbose = true,
            "--json" => options.json = true,
            "--help" | "-h" => options.show_help = true,
            _ if arg.starts_with("--") => bail!("unknown flag '{arg}'"),
            _ => positional.push(arg.clone()),
        }
    }
    if options.show_help || positional.is_empty() {
        return Ok(options);
    }
    let verb = positional.remove(0);
    options.command = Some(match verb.as_str() {
        "pack" => {
            if positional.len() < 2 {
                bail!("pack requires an output path and at least one input file");
            }
            let output = PathBuf::from(positional.remove(0));
            Command::Pack { output, inputs: positional.into_iter().map(PathBuf::from).collect() }
        }
        "list" | "inspect" => {
            let [bundle] = positional.as_slice() else {
                bail!("{verb} requires exactly one bundle path");
            };
            let bundle = PathBuf::from(bundle);
            if verb == "list" {
                Command::List { bundle }
            } else {
                Command::Inspect { bundle }
            }
        }
        other => bail!("unknown command '{other}'"),
    });
    Ok(options)
}

fn file_name(path: &Path) -> Result<String> {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(str::to_string)
        .ok_or_else(|| anyhow!("path '{}' has no usable file name", path.display()))
}

fn pack(output: &Path, inputs: &[PathBuf]) -> Result<()> {
    let mut bundle = AssetBundle::new();
    for input in inputs {
        let name = file_name(input)?;
        let lower = name.to_ascii_lowercase();
        let bytes = fs::read(input).with_context(|| format!("failed to read '{}'", input.display()))?;
        let (entry_name, entry) = if lower.ends_with(".obj") {
            let text = String::from_utf8(bytes).with_context(|| format!("'{}' is not UTF-8", input.display()))?;
            (format!("assets/{name}"), BundleEntry::Text(text))
        } else if lower.ends_with(".mat.json") {
            let data: MaterialData = serde_json::from_slice(&bytes)
                .with_context(|| format!("failed to parse material '{}'", input.display()))?;
            (data.name.clone(), BundleEntry::Material(data))
        } else if lower.ends_with(".prefab.json") {
            let data: PrefabData = serde_json::from_slice(&bytes)
                .with_context(|| format!("failed to parse prefab '{}'", input.display()))?;
            (data.name.clone(), BundleEntry::Prefab(data))
        } else {
            bail!("unsupported input '{}' (expected .obj, .mat.json or .prefab.json)", input.display());
        };
        debug!("Packing '{}' as {} entry '{entry_name}'", input.display(), entry.kind());
        if bundle.insert(entry_name.clone(), entry).is_some() {
            bail!("duplicate entry '{entry_name}'");
        }
    }
    bundle.save_to_path(output).with_context(|| format!("failed to write bundle '{}'", output.display()))?;
    info!("Wrote {} entries to {}", bundle.len(), output.display());
    Ok(())
}

fn list(path: &Path, as_json: bool) -> Result<()> {
    let bundle =
        AssetBundle::load_from_path(path).with_context(|| format!("failed to load bundle '{}'", path.display()))?;
    if as_json {
        let entries: Vec<_> =
            bundle.entries().map(|(name, entry)| json!({ "name": name, "kind": entry.kind() })).collect();
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }
    for (name, entry) in bundle.entries() {
        println!("{:<8} {name}", entry.kind());
    }
    println!("{} entries", bundle.len());
    Ok(())
}

fn inspect(config: &ReplacerConfig, path: &Path, as_json: bool) -> Result<()> {
    let mut host = MemoryHost::new();
    let mut loader = MeshArchiveLoader::new(config.archive.clone());
    let resolved = loader.resolve_mesh(&mut host, path)?;
    let materials = loader.resolve_materials(&mut host, path).unwrap_or_default();
    let mesh_name = host.mesh_name(resolved.mesh).unwrap_or_default();
    let vertices = host.mesh_vertex_count(resolved.mesh).unwrap_or_default();
    let readable = host.mesh_is_readable(resolved.mesh);
    let material_names: Vec<String> = materials.iter().filter_map(|&m| host.material_name(m)).collect();
    loader.close(&mut host);
    let stats = host.stats();
    debug!("Leftover renderers after inspection: {}", host.renderers().len());

    if as_json {
        let report = json!({
            "source": format!("{:?}", resolved.source),
            "mesh": mesh_name,
            "vertices": vertices,
            "readable": readable,
            "materials": material_names,
            "prefab_instances": stats.instantiated,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }
    println!("Source:    {:?}", resolved.source);
    println!("Mesh:      {mesh_name} ({vertices} vertices, readable: {readable})");
    if material_names.is_empty() {
        println!("Materials: none");
    } else {
        println!("Materials: {}", material_names.join(", "));
    }
    println!("Transient prefab instances: {}", stats.instantiated);
    Ok(())
}

use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use pbc::codegen;

fn main() -> Result<()> {
    let mut args = std::env::args().skip(1);
    let mut output_path: Option<PathBuf> = None;
    let mut emit_runtime = false;
    let mut build = false;
    let mut run = false;
    let mut input_path: Option<String> = None;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-o" | "--output" => {
                let path = args
                    .next()
                    .ok_or_else(|| anyhow::anyhow!("Missing output path after {arg}"))?;
                output_path = Some(PathBuf::from(path));
            }
            "--emit-runtime" => emit_runtime = true,
            "--build" => build = true,
            "--run" => {
                build = true;
                run = true;
            }
            _ => {
                input_path = Some(arg);
                if args.next().is_some() {
                    bail!("Only one input file is supported");
                }
                break;
            }
        }
    }

    let source = if let Some(path) = &input_path {
        fs::read_to_string(path).with_context(|| format!("Reading {path}"))?
    } else {
        let mut buffer = String::new();
        io::stdin()
            .read_to_string(&mut buffer)
            .context("Reading stdin")?;
        buffer
    };

    let c_source = pbc::compile(&source)?;

    let c_path = output_path.unwrap_or_else(|| {
        input_path
            .as_deref()
            .map(|path| PathBuf::from(path).with_extension("c"))
            .unwrap_or_else(|| PathBuf::from("out.c"))
    });
    fs::write(&c_path, &c_source).with_context(|| format!("Writing {}", c_path.display()))?;

    let out_dir = c_path
        .parent()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    if emit_runtime || build {
        codegen::write_runtime(&out_dir)?;
    }

    if build {
        let binary_path = c_path.with_extension("");
        codegen::compile_c(&c_path, &binary_path)?;
        if run {
            let output = codegen::run_compiled_binary(&binary_path)?;
            if !output.is_empty() {
                print!("{output}");
            }
        }
    }

    Ok(())
}

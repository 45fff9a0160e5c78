//! Filesystem and process access for the extended profile. Both are
//! confined to the configured root directory.

use std::path::{Component, Path, PathBuf};
use std::process::{Output, Stdio};

use rhai::{Array, Dynamic, INT, ImmutableString, Map, Module};
use tokio::process::Command;

use super::Host;
use crate::error::GatewayError;
use crate::sandbox::RhaiResultOf;

/// Resolve `relative` under `root`, rejecting absolute paths and `..`.
pub(crate) fn confine(root: &Path, relative: &str) -> RhaiResultOf<PathBuf> {
    let path = Path::new(relative);
    let contained = path
        .components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
    if !contained {
        return Err(format!("path '{relative}' is outside the sandbox root").into());
    }
    Ok(root.join(path))
}

fn io_error(action: &str, path: &str, e: std::io::Error) -> Box<rhai::EvalAltResult> {
    format!("{action} '{path}': {e}").into()
}

pub(super) fn fs_module(root: PathBuf) -> Module {
    let mut module = Module::new();

    let r = root.clone();
    module.set_native_fn("read", move |path: ImmutableString| -> RhaiResultOf<String> {
        std::fs::read_to_string(confine(&r, &path)?).map_err(|e| io_error("read", &path, e))
    });
    let r = root.clone();
    module.set_native_fn(
        "write",
        move |path: ImmutableString, content: ImmutableString| -> RhaiResultOf<()> {
            let target = confine(&r, &path)?;
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent).map_err(|e| io_error("create", &path, e))?;
            }
            std::fs::write(&target, content.as_bytes()).map_err(|e| io_error("write", &path, e))
        },
    );
    let r = root.clone();
    module.set_native_fn("exists", move |path: ImmutableString| -> RhaiResultOf<bool> {
        Ok(confine(&r, &path)?.exists())
    });
    let r = root;
    module.set_native_fn("list", move |path: ImmutableString| -> RhaiResultOf<Array> {
        let dir = confine(&r, &path)?;
        let mut names = std::fs::read_dir(&dir)
            .map_err(|e| io_error("list", &path, e))?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .collect::<Vec<_>>();
        names.sort();
        Ok(names.into_iter().map(Dynamic::from).collect())
    });

    module
}

/// The child is killed when the budget runs out and the future is dropped.
async fn run_process(
    root: PathBuf,
    program: String,
    args: Vec<String>,
) -> Result<Output, GatewayError> {
    Command::new(&program)
        .args(&args)
        .current_dir(&root)
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| GatewayError::Sandbox(format!("exec '{program}': {e}")))
}

fn exec(host: &Host, root: &Path, program: &str, args: Vec<String>) -> RhaiResultOf<Map> {
    let output = host.block_on(run_process(root.to_path_buf(), program.to_string(), args))?;

    let mut out = Map::new();
    out.insert(
        "status".into(),
        Dynamic::from(INT::from(output.status.code().unwrap_or(-1))),
    );
    out.insert(
        "stdout".into(),
        Dynamic::from(String::from_utf8_lossy(&output.stdout).into_owned()),
    );
    out.insert(
        "stderr".into(),
        Dynamic::from(String::from_utf8_lossy(&output.stderr).into_owned()),
    );
    Ok(out)
}

/// `process::exec(program[, args])`, run with the sandbox root as working
/// directory and bounded by the execution budget.
pub(super) fn process_module(root: PathBuf, host: Host) -> Module {
    let mut module = Module::new();

    let (r, h) = (root.clone(), host.clone());
    module.set_native_fn("exec", move |program: ImmutableString| {
        exec(&h, &r, &program, Vec::new())
    });
    let (r, h) = (root, host);
    module.set_native_fn("exec", move |program: ImmutableString, args: Array| {
        let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
        exec(&h, &r, &program, args)
    });

    module
}

use std::collections::BTreeMap;
use std::path::PathBuf;

use rhai::module_resolvers::FileModuleResolver;
use rhai::{Engine, EvalAltResult, Module, ModuleResolver, Position, Shared};

use super::RhaiResultOf;
use super::capabilities::system::confine;

/// Import paths that are refused outright.
pub const DENIED_MODULES: &[&str] = &["aws-sdk"];

/// Resolves `import` statements: denied aliases fail, capability modules
/// resolve by name, and in the extended profile anything else is loaded as
/// a script file under the sandbox root.
pub struct GatewayModuleResolver {
    modules: BTreeMap<String, Shared<Module>>,
    files: Option<(PathBuf, FileModuleResolver)>,
}

impl GatewayModuleResolver {
    pub fn new(fs_root: Option<PathBuf>) -> Self {
        Self {
            modules: BTreeMap::new(),
            files: fs_root.map(|root| {
                let resolver = FileModuleResolver::new_with_path(root.clone());
                (root, resolver)
            }),
        }
    }

    pub fn insert(&mut self, name: &str, module: Shared<Module>) {
        self.modules.insert(name.to_string(), module);
    }
}

impl ModuleResolver for GatewayModuleResolver {
    fn resolve(
        &self,
        engine: &Engine,
        source: Option<&str>,
        path: &str,
        pos: Position,
    ) -> RhaiResultOf<Shared<Module>> {
        if DENIED_MODULES.contains(&path) {
            return Err(EvalAltResult::ErrorRuntime(
                format!("module '{path}' is not available in the sandbox").into(),
                pos,
            )
            .into());
        }

        if let Some(module) = self.modules.get(path) {
            return Ok(module.clone());
        }

        match &self.files {
            Some((root, files)) => {
                confine(root, path)?;
                files.resolve(engine, source, path, pos)
            }
            None => Err(EvalAltResult::ErrorModuleNotFound(path.to_string(), pos).into()),
        }
    }
}

use std::sync::Arc;

use agent_core::{CompileDependencies, CompileResult, PackageSpec};
use anyhow::Context;
use async_trait::async_trait;

use crate::action::TypedAction;
use crate::platform::Compiler;

pub struct CompilePackageAction {
    compiler: Arc<dyn Compiler>,
}

impl CompilePackageAction {
    pub fn new(compiler: Arc<dyn Compiler>) -> Self {
        Self { compiler }
    }
}

#[async_trait]
impl TypedAction for CompilePackageAction {
    const NAME: &'static str = "compile_package";
    const ASYNCHRONOUS: bool = true;
    const PERSISTENT: bool = true;

    /// `(blobstore_id, sha1, name, version, dependencies)`
    type Args = (String, String, String, String, CompileDependencies);
    type Output = CompileResult;

    async fn execute(&self, args: Self::Args) -> anyhow::Result<CompileResult> {
        let (blobstore_id, sha1, name, version, deps) = args;
        let package = PackageSpec {
            name,
            version,
            sha1,
            blobstore_id,
        };
        let result = self
            .compiler
            .compile(&package, &deps)
            .await
            .with_context(|| format!("Compiling package {}", package.name))?;
        Ok(CompileResult { result })
    }
}

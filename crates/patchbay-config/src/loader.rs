//! Configuration file loader
//!
//! Reads the line-oriented configuration format and drives the engine's
//! configuration phase: global backend options, instance creation and
//! options, includes and channel mappings.

use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use patchbay_core::{BackendId, ChannelDirection, Engine, InstanceId};

use crate::error::{ConfigError, Result};
use crate::glob::ChannelSpec;
use crate::overrides::{Override, OverrideKind};

/// Include nesting limit, stops include cycles
pub const MAX_INCLUDE_DEPTH: usize = 16;

/// Section the parser is currently in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    None,
    Backend(BackendId),
    Instance(InstanceId),
    Map,
}

/// Mapping operator of a `[map]` line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    LeftToRight,
    RightToLeft,
    Both,
}

/// Changes into a directory and changes back on drop
struct WorkingDir {
    previous: Option<PathBuf>,
}

impl WorkingDir {
    fn enter(dir: &Path) -> Result<Self> {
        if dir.as_os_str().is_empty() {
            return Ok(Self { previous: None });
        }

        let io_error = |source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        };
        let previous = std::env::current_dir().map_err(io_error)?;
        std::env::set_current_dir(dir).map_err(io_error)?;
        debug!("Changed working directory to {}", dir.display());

        Ok(Self {
            previous: Some(previous),
        })
    }
}

impl Drop for WorkingDir {
    fn drop(&mut self) {
        if let Some(previous) = self.previous.take() {
            if let Err(e) = std::env::set_current_dir(&previous) {
                warn!(
                    "Failed to return to working directory {}: {}",
                    previous.display(),
                    e
                );
            }
        }
    }
}

/// Loads configuration text into an [`Engine`]
pub struct ConfigLoader<'e> {
    engine: &'e mut Engine,
    overrides: Vec<Override>,
    section: Section,
    depth: usize,
}

impl<'e> ConfigLoader<'e> {
    pub fn new(engine: &'e mut Engine) -> Self {
        Self {
            engine,
            overrides: Vec::new(),
            section: Section::None,
            depth: 0,
        }
    }

    pub fn with_overrides(mut self, overrides: Vec<Override>) -> Self {
        self.overrides = overrides;
        self
    }

    pub fn add_override(&mut self, value: Override) {
        self.overrides.push(value);
    }

    pub fn overrides(&self) -> &[Override] {
        &self.overrides
    }

    /// Overrides whose target section was never encountered
    pub fn unapplied_overrides(&self) -> impl Iterator<Item = &Override> {
        self.overrides.iter().filter(|o| !o.is_handled())
    }

    /// Load a configuration file.
    ///
    /// The file is parsed with its own directory as the working directory;
    /// the previous working directory is restored afterwards, also on error.
    pub fn load(&mut self, path: impl AsRef<Path>) -> Result<()> {
        self.read_file(path.as_ref())?;
        self.report_unapplied();
        Ok(())
    }

    /// Load configuration text that does not come from a file.
    ///
    /// Includes are resolved against the current working directory.
    pub fn load_str(&mut self, source: &str) -> Result<()> {
        self.parse_source(Path::new("<string>"), source)?;
        self.report_unapplied();
        Ok(())
    }

    fn report_unapplied(&self) {
        for o in self.unapplied_overrides() {
            let kind = match o.kind {
                OverrideKind::Backend => "backend",
                OverrideKind::Instance => "instance",
            };
            warn!(
                "Override {}.{}={} was never applied, no {} {} configured",
                o.target, o.option, o.value, kind, o.target
            );
        }
    }

    fn read_file(&mut self, path: &Path) -> Result<()> {
        let file_name = path
            .file_name()
            .ok_or_else(|| ConfigError::Syntax(format!("{} is not a file", path.display())))?;
        let dir = path.parent().unwrap_or_else(|| Path::new(""));

        let _cwd = WorkingDir::enter(dir)?;
        info!("Reading configuration file {}", path.display());

        let source = std::fs::read_to_string(file_name).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        self.parse_source(path, &source)
    }

    fn parse_source(&mut self, file: &Path, source: &str) -> Result<()> {
        for (index, line) in source.lines().enumerate() {
            self.line(line).map_err(|e| ConfigError::Line {
                file: file.to_path_buf(),
                line: index + 1,
                source: Box::new(e),
            })?;
        }
        Ok(())
    }

    fn line(&mut self, raw: &str) -> Result<()> {
        let line = raw.trim();
        if line.is_empty() || line.starts_with(';') {
            return Ok(());
        }

        if line.starts_with('[') && line.ends_with(']') && line.len() >= 2 {
            return self.header(line[1..line.len() - 1].trim());
        }

        match self.section {
            Section::Map => self.mapping(line),
            Section::Backend(backend) => {
                let (option, value) = split_assignment(line)?;
                Ok(self.engine.configure_backend(backend, option, value)?)
            }
            Section::Instance(instance) => {
                let (option, value) = split_assignment(line)?;
                Ok(self.engine.configure_instance(instance, option, value)?)
            }
            Section::None => Err(ConfigError::Syntax(format!(
                "{} appears outside of any section",
                line
            ))),
        }
    }

    // =========================================================================
    // Sections
    // =========================================================================

    fn header(&mut self, header: &str) -> Result<()> {
        if header == "map" {
            self.section = Section::Map;
            return Ok(());
        }

        if let Some(path) = header.strip_prefix("include ") {
            return self.include(path.trim());
        }

        if let Some(name) = header.strip_prefix("backend ") {
            let name = name.trim();
            let backend = self
                .engine
                .backend_id(name)
                .ok_or_else(|| patchbay_core::Error::UnknownBackend(name.to_string()))?;
            self.section = Section::Backend(backend);
            return self.apply_backend_overrides(backend, name);
        }

        let (backend_name, instance_name) = header.split_once(' ').ok_or_else(|| {
            ConfigError::Syntax(format!("no instance name specified for backend {}", header))
        })?;
        let backend = self
            .engine
            .backend_id(backend_name)
            .ok_or_else(|| patchbay_core::Error::UnknownBackend(backend_name.to_string()))?;

        let instance_name = instance_name.trim();
        let instance = self.engine.create_instance(backend, instance_name)?;
        self.section = Section::Instance(instance);
        self.apply_instance_overrides(instance, instance_name)
    }

    fn include(&mut self, path: &str) -> Result<()> {
        if path.is_empty() {
            return Err(ConfigError::Syntax("include without a path".to_string()));
        }
        if self.depth >= MAX_INCLUDE_DEPTH {
            return Err(ConfigError::Syntax(format!(
                "includes nested deeper than {} levels at {}",
                MAX_INCLUDE_DEPTH, path
            )));
        }

        // the including file continues in the section it was in
        let section = self.section;
        self.depth += 1;
        let result = self.read_file(Path::new(path));
        self.depth -= 1;
        self.section = section;
        result
    }

    fn apply_backend_overrides(&mut self, backend: BackendId, name: &str) -> Result<()> {
        for o in self.overrides.iter_mut() {
            if o.matches(OverrideKind::Backend, name) {
                self.engine.configure_backend(backend, &o.option, &o.value)?;
                o.mark_handled();
                info!("Applied override {}.{}={}", name, o.option, o.value);
            }
        }
        Ok(())
    }

    fn apply_instance_overrides(&mut self, instance: InstanceId, name: &str) -> Result<()> {
        for o in self.overrides.iter_mut() {
            if o.matches(OverrideKind::Instance, name) {
                self.engine.configure_instance(instance, &o.option, &o.value)?;
                o.mark_handled();
                info!("Applied override {}.{}={}", name, o.option, o.value);
            }
        }
        Ok(())
    }

    // =========================================================================
    // Mappings
    // =========================================================================

    fn mapping(&mut self, line: &str) -> Result<()> {
        let position = line
            .find(['<', '>'])
            .ok_or_else(|| ConfigError::Syntax(format!("not a channel mapping: {}", line)))?;

        let rest = &line[position + 1..];
        let (direction, right) = match (line.as_bytes()[position], rest.as_bytes().first()) {
            (b'<', Some(b'>')) => (Direction::Both, &rest[1..]),
            (b'>', Some(b'<')) => {
                return Err(ConfigError::Syntax(format!(
                    "unknown mapping operator >< in {}, use <>",
                    line
                )));
            }
            (b'<', _) => (Direction::RightToLeft, rest),
            _ => (Direction::LeftToRight, rest),
        };
        let (left, right) = (line[..position].trim(), right.trim());

        if left.is_empty() || right.is_empty() {
            return Err(ConfigError::Syntax(format!("incomplete channel mapping: {}", line)));
        }

        if matches!(direction, Direction::LeftToRight | Direction::Both) {
            self.map_specs(left, right)?;
        }
        if matches!(direction, Direction::RightToLeft | Direction::Both) {
            self.map_specs(right, left)?;
        }
        Ok(())
    }

    /// Expand `from` and `to` and add one edge per expansion step
    fn map_specs(&mut self, from: &str, to: &str) -> Result<u64> {
        let (from_instance, from_spec) = self.split_endpoint(from)?;
        let (to_instance, to_spec) = self.split_endpoint(to)?;

        let (from_count, to_count) = (from_spec.count(), to_spec.count());
        if from_count != to_count && from_count != 1 && to_count != 1 {
            return Err(ConfigError::ChannelCountMismatch {
                from: from.to_string(),
                from_count,
                to: to.to_string(),
                to_count,
            });
        }

        let total = from_count.max(to_count);
        let mut added = 0;
        for n in 0..total {
            let source = self.engine.resolve_channel(
                from_instance,
                &from_spec.resolve(n % from_count),
                ChannelDirection::Input,
            )?;
            let destination = self.engine.resolve_channel(
                to_instance,
                &to_spec.resolve(n % to_count),
                ChannelDirection::Output,
            )?;
            if self.engine.map_channel(source, destination)? {
                added += 1;
            }
        }

        debug!("Mapped {} to {} ({} channels, {} new edges)", from, to, total, added);
        Ok(added)
    }

    fn split_endpoint(&self, endpoint: &str) -> Result<(InstanceId, ChannelSpec)> {
        let (name, spec) = endpoint.split_once('.').ok_or_else(|| {
            ConfigError::Syntax(format!(
                "mapping endpoint {} does not contain an instance specification",
                endpoint
            ))
        })?;
        if spec.is_empty() {
            return Err(ConfigError::Syntax(format!(
                "mapping endpoint {} has an empty channel spec",
                endpoint
            )));
        }

        let instance = self
            .engine
            .core()
            .instance_by_name(name)
            .ok_or_else(|| patchbay_core::Error::UnknownInstance(name.to_string()))?;
        Ok((instance, ChannelSpec::scan(spec)?))
    }
}

/// Split an `option = value` line
fn split_assignment(line: &str) -> Result<(&str, &str)> {
    let (option, value) = line
        .split_once('=')
        .ok_or_else(|| ConfigError::Syntax(format!("not an assignment: {}", line)))?;
    let (option, value) = (option.trim(), value.trim());
    if option.is_empty() {
        return Err(ConfigError::Syntax(format!("missing option name: {}", line)));
    }
    Ok((option, value))
}

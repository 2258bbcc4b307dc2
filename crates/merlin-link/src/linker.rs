//! The `Linker` context: the explicit struct spec.md 9 calls for in place
//! of process-wide globals. One instance is created per invocation of the
//! CLI (direct-file mode) or per link-script run, and owns every piece of
//! state those two front ends share: the symbol store, the segment list,
//! the script-run variables, and the handful of CLI-level options.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::metadata::{AppleDoubleMetadata, FileTypeSink, UnitMetadataSource};
use crate::omf::object_emit;
use crate::omf::{BinaryWriter, FlatBinaryWriter, ImageHeader, ImageWriter, OmfV2Writer};
use crate::rel::decode_unit;
use crate::resolve::{resolve_segment, ResolveOptions};
use crate::script;
use crate::segment::SegmentList;
use crate::symbol::{DefineOutcome, DefineScope, SymbolTable};

/// CLI-level configuration (spec.md 6), populated once per process
/// invocation and shared by both front ends.
#[derive(Clone)]
pub struct LinkerConfig {
    /// `-o`, default `gs.out`.
    pub output: PathBuf,
    /// `-v`.
    pub verbose: bool,
    /// `-X` clears this (suppress the express-load helper segment).
    pub express: bool,
    /// `-C` clears this (suppress SUPER compression).
    pub compress: bool,
    /// `-D key[=value]` definitions, in command-line order.
    pub defines: Vec<(String, u32)>,
    /// Extra library search directories, beyond the directories of units
    /// this run has already linked (spec.md 4.6 names no registration
    /// opcode; DESIGN.md records this as the chosen mechanism).
    pub library_dirs: Vec<PathBuf>,
    /// Reads the file-type/aux-type (code length) metadata for input
    /// units. Defaults to [`AppleDoubleMetadata`]; spec.md 1 scopes out
    /// *how* a host reads this metadata, not the value the decoder needs,
    /// so a caller with real ProDOS/HFS access (or a test double) can
    /// substitute its own.
    pub metadata: Arc<dyn UnitMetadataSource>,
    /// Writes the output file's file-type/aux-type once linking finishes.
    pub sink: Arc<dyn FileTypeSink>,
}

impl std::fmt::Debug for LinkerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinkerConfig")
            .field("output", &self.output)
            .field("verbose", &self.verbose)
            .field("express", &self.express)
            .field("compress", &self.compress)
            .field("defines", &self.defines)
            .field("library_dirs", &self.library_dirs)
            .finish_non_exhaustive()
    }
}

impl Default for LinkerConfig {
    fn default() -> Self {
        LinkerConfig {
            output: PathBuf::from("gs.out"),
            verbose: false,
            express: true,
            compress: true,
            defines: Vec::new(),
            library_dirs: Vec::new(),
            metadata: Arc::new(AppleDoubleMetadata),
            sink: Arc::new(AppleDoubleMetadata),
        }
    }
}

/// The process-wide link context.
pub struct Linker {
    /// The global symbol table shared by every unit and script opcode.
    pub symbols: SymbolTable,
    /// Every segment produced so far, in creation order.
    pub segments: SegmentList,
    /// Link-script run state (spec.md 3); unused in direct-file mode.
    pub script: script::state::ScriptState,
    /// CLI-level configuration this context was built from.
    pub config: LinkerConfig,
    metadata: Arc<dyn UnitMetadataSource>,
    sink: Arc<dyn FileTypeSink>,
    current: usize,
    /// Directories of units already linked, auto-registered for library
    /// search (spec.md 4.6).
    linked_dirs: Vec<PathBuf>,
}

impl std::fmt::Debug for Linker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Linker")
            .field("symbols", &self.symbols)
            .field("segments", &self.segments)
            .field("script", &self.script)
            .field("config", &self.config)
            .field("current", &self.current)
            .field("linked_dirs", &self.linked_dirs)
            .finish_non_exhaustive()
    }
}

impl Linker {
    /// Build a fresh context: pre-populate the symbol table and the
    /// script-local map with `-D` definitions (spec.md 4.1, 6), and start
    /// with one empty segment.
    pub fn new(config: LinkerConfig) -> Self {
        let mut symbols = SymbolTable::new();
        let mut locals = HashMap::new();
        for (name, value) in &config.defines {
            symbols.define_absolute(name.as_bytes(), *value, None);
            locals.insert(name.as_bytes().to_vec(), *value);
        }
        let mut segments = SegmentList::new();
        segments.push("CODE", "CODE");
        let mut script = script::state::ScriptState::new();
        script.locals = locals;

        let metadata = config.metadata.clone();
        let sink = config.sink.clone();
        Linker {
            symbols,
            segments,
            script,
            metadata,
            sink,
            current: 0,
            linked_dirs: Vec::new(),
            config,
        }
    }

    fn resolved_path(&self, raw: &str) -> PathBuf {
        if self.script.cwd.as_os_str().is_empty() {
            PathBuf::from(raw)
        } else {
            self.script.cwd.join(raw)
        }
    }

    /// Decode one REL unit into the current segment, tracking `pos_var`
    /// and `len_var` (spec.md 4.4: "updated by the decoder ... with the
    /// byte count actually added").
    pub fn link_unit(&mut self, raw_path: &str) -> Result<()> {
        let path = self.resolved_path(raw_path);
        let file = std::fs::File::open(&path)?;
        // Mapped rather than read into a `Vec`: the mapping lives only for
        // this call, matching the single-unit scope spec.md 5 describes.
        let mapping = unsafe { memmap2::Mmap::map(&file)? };
        let data: &[u8] = &mapping;
        let source = path.display().to_string();
        let code_length = self.metadata.aux_type(&path).ok_or_else(|| {
            Error::decode(format!(
                "{}: no aux-type (code length) metadata available",
                source
            ))
        })? as usize;
        let idx = self.current;
        let decoded = decode_unit(
            &mut self.symbols,
            self.segments.get_mut(idx),
            &source,
            data,
            code_length,
        )?;
        self.script.len_var = decoded.bytes_added;
        self.script.pos_var += decoded.bytes_added;

        if let Some(dir) = path.parent() {
            let dir = dir.to_path_buf();
            if !dir.as_os_str().is_empty() && !self.linked_dirs.contains(&dir) {
                self.linked_dirs.push(dir);
            }
        }
        Ok(())
    }

    /// `IMP path`: append a file's raw bytes and define a symbol at the
    /// offset they were placed at, named after the path's basename with
    /// non-alphanumerics mapped to `_` and letters upper-cased (spec.md
    /// 4.4).
    pub fn import_raw(&mut self, raw_path: &str) -> Result<()> {
        let path = self.resolved_path(raw_path);
        let file = std::fs::File::open(&path)?;
        let mapping = unsafe { memmap2::Mmap::map(&file)? };
        let data: &[u8] = &mapping;
        let idx = self.current;
        let segment_number = self.segments.get(idx).number();
        let offset = self.segments.get_mut(idx).append(data);
        self.script.len_var = data.len() as u32;
        self.script.pos_var += data.len() as u32;

        let name = basename_symbol(&path);
        let (_, outcome) =
            self.symbols
                .define_relative(name.as_bytes(), offset, segment_number, Some(raw_path));
        if outcome == DefineOutcome::Conflict {
            log::warn!("{}: symbol previously defined with a different value", name);
        }
        Ok(())
    }

    /// Define a symbol in the sinks `scope` selects (spec.md 4.1).
    pub fn define(&mut self, name: &[u8], value: u32, scope: DefineScope) {
        if scope.contains(DefineScope::LINKER) {
            let (_, outcome) = self.symbols.define_absolute(name, value, None);
            if outcome == DefineOutcome::Conflict {
                log::warn!(
                    "{}: previously defined with a different value",
                    String::from_utf8_lossy(name)
                );
            }
        }
        if scope.contains(DefineScope::SCRIPT_LOCAL) {
            match self.script.locals.get(name) {
                Some(&existing) if existing != value => {
                    log::warn!(
                        "{}: previously defined locally with a different value",
                        String::from_utf8_lossy(name)
                    );
                }
                _ => {
                    self.script.locals.insert(name.to_vec(), value);
                }
            }
        }
    }

    /// `EXT label`: copy a defined absolute global into the script-local
    /// table.
    pub fn import_external(&mut self, name: &[u8]) -> Result<()> {
        let id = self
            .symbols
            .find(name, false)
            .ok_or_else(|| Error::script(format!("'{}' is not defined", String::from_utf8_lossy(name))))?;
        let sym = self.symbols.get(id);
        if !sym.is_defined() || !sym.is_absolute() {
            return Err(Error::script(format!(
                "'{}' is not a defined absolute global",
                String::from_utf8_lossy(name)
            )));
        }
        self.script.locals.insert(name.to_vec(), sym.value());
        Ok(())
    }

    fn search_libraries(&mut self) -> Result<()> {
        let mut dirs = self.linked_dirs.clone();
        dirs.extend(self.config.library_dirs.iter().cloned());
        if dirs.is_empty() {
            return Ok(());
        }
        let idx = self.current;
        let loaded = crate::library::search_libraries(
            &mut self.symbols,
            self.segments.get_mut(idx),
            &dirs,
            &self.metadata,
        )?;
        for name in &loaded {
            log::debug!("library search resolved '{}'", name);
        }
        Ok(())
    }

    fn header(&self) -> ImageHeader {
        ImageHeader {
            file_type: self.script.ftype,
            aux_type: self.script.atype,
            origin: self.script.org,
            load_name: self
                .script
                .load_name
                .clone()
                .unwrap_or_else(|| "OUT".to_string()),
        }
    }

    fn write_to(&mut self, path: &Path) -> Result<()> {
        match self.script.lkv {
            0 => {
                let mut out = Vec::new();
                FlatBinaryWriter.write_binary(self.segments.as_slice(), &mut out)?;
                std::fs::write(path, &out)?;
            }
            1 | 2 => {
                let header = self.header();
                let mut out = Vec::new();
                OmfV2Writer.write_image(self.segments.as_slice(), &header, &mut out)?;
                std::fs::write(path, &out)?;
            }
            3 => {
                let idx = self.current;
                let mut out = Vec::new();
                let symbols = &self.symbols;
                object_emit::emit(symbols, self.segments.get_mut(idx), &mut out)?;
                std::fs::write(path, &out)?;
            }
            other => return Err(Error::script(format!("invalid LKV {}", other))),
        }
        self.sink
            .set_file_type(path, self.script.ftype, self.script.atype)?;
        Ok(())
    }

    /// `SAV path`: finalize per spec.md 4.4. In modes 0/1/3, `path` is a
    /// real output path and the first `SAV` in a run fixes it for the
    /// whole run. In mode 2, `path` instead names the segment this call
    /// closes (spec.md 8, S3); the real output path is always
    /// `config.output`, since mode 2 writes every segment together at
    /// `END`, not once per `SAV`.
    pub fn save(&mut self, path: Option<String>) -> Result<()> {
        self.search_libraries()?;
        let idx = self.current;
        resolve_segment(
            &self.symbols,
            self.segments.get_mut(idx),
            ResolveOptions {
                allow_unresolved: self.script.lkv == 3,
            },
        )?;

        match self.script.lkv {
            2 => {
                if let Some(name) = &path {
                    let seg = self.segments.get_mut(idx);
                    seg.set_name(name.clone());
                    seg.set_load_name(name.clone());
                }
                self.current = self.segments.push("CODE", "CODE");
            }
            _ => {
                let save_path = match path.as_deref() {
                    Some(p) => self.resolved_path(p),
                    None => self
                        .script
                        .save_path
                        .clone()
                        .unwrap_or_else(|| self.config.output.clone()),
                };
                if self.script.save_path.is_none() {
                    self.script.save_path = Some(save_path.clone());
                    self.script.load_name = Some(load_name_from_path(&save_path));
                }
                self.write_to(&save_path)?;
                self.segments.reset();
                self.current = self.segments.push("CODE", "CODE");
                self.script.reset_for_new_artifact();
            }
        }
        Ok(())
    }

    /// `END`: in mode 2, drop the trailing empty segment and write every
    /// segment; otherwise flush anything the last `SAV` didn't already
    /// cover.
    pub fn end(&mut self) -> Result<()> {
        self.script.end = true;
        match self.script.lkv {
            2 => {
                self.search_libraries()?;
                for segment in 0..self.segments.len() {
                    resolve_segment(&self.symbols, self.segments.get_mut(segment), ResolveOptions::default())?;
                }
                self.segments.drop_trailing_if_empty();
                let path = self
                    .script
                    .save_path
                    .clone()
                    .unwrap_or_else(|| self.config.output.clone());
                self.write_to(&path)?;
            }
            _ => {
                if !self.segments.get(self.current).is_empty() {
                    let path = self
                        .script
                        .save_path
                        .clone()
                        .unwrap_or_else(|| self.config.output.clone());
                    self.save(Some(path.display().to_string()))?;
                }
            }
        }
        Ok(())
    }

    /// Run a link script read from `path`.
    pub fn run_script(&mut self, path: &Path) -> Result<()> {
        let text = std::fs::read_to_string(path)?;
        script::interp::run(self, &path.display().to_string(), &text)
    }

    /// Direct-file mode (spec.md 2): bypass the script interpreter
    /// entirely, decode every input into one segment, resolve, and write.
    pub fn link_direct(&mut self, inputs: &[PathBuf]) -> Result<()> {
        for path in inputs {
            self.link_unit(&path.display().to_string())?;
        }
        self.search_libraries()?;
        let idx = self.current;
        resolve_segment(&self.symbols, self.segments.get_mut(idx), ResolveOptions::default())?;
        let out = self.config.output.clone();
        self.write_to(&out)
    }
}

/// Map a path's file stem to an `IMP`-defined symbol name: non-alphanumeric
/// bytes become `_`, letters are upper-cased (spec.md 4.4).
fn basename_symbol(path: &Path) -> String {
    let stem = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    stem.chars()
        .map(|c| if c.is_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
        .collect()
}

fn load_name_from_path(path: &Path) -> String {
    path.file_stem()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "OUT".to_string())
}

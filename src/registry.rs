//! Named coding-system table.
//!
//! A [`Registry`] owns every charset, translation table, conversion program
//! and coding-system definition a conversion may refer to, together with
//! the category priority used by detection. It is passed by reference into
//! every conversion; nothing here is global.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::buffer::ScratchPool;
use crate::charset::{CharsetId, CharsetRegistry, CharsetSpec, Charsets};
use crate::codec::ccl::ByteCodeProgram;
use crate::codec::charset_table::CharsetTable;
use crate::coding::{
    BomPolicy, CclParams, CodecKind, CodecSpec, CodingCategory, CodingSystem, CodingSystemSpec,
    Endian, EolType, Iso2022Flags, Iso2022Params,
};
use crate::convert::{StreamingDecoder, StreamingEncoder};
use crate::multibyte::is_valid_char;
use crate::session::ConvertOptions;
use crate::translate::{TranslationTable, TranslationTableSpec};
use crate::{Error, Result};

/// Coding system used for file names until configured otherwise.
pub const DEFAULT_FILE_NAME_CODING: &str = "utf-8-unix";

/// A single field replaced by [`Registry::put_property`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "property", content = "value", rename_all = "kebab-case")]
pub enum Property {
    /// One-character indicator.
    Mnemonic(char),
    /// Substitute for unencodable characters.
    DefaultChar(u32),
    /// Translation table applied after decoding.
    DecodeTranslation(Option<String>),
    /// Translation table applied before encoding.
    EncodeTranslation(Option<String>),
    /// ASCII-compatibility flag.
    AsciiCompatible(bool),
    /// Hook run by the host after reading.
    PostReadHook(Option<String>),
    /// Hook run by the host before writing.
    PreWriteHook(Option<String>),
}

/// Definitions loaded by [`Registry::load_config`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Charsets, defined first.
    pub charsets: Vec<CharsetSpec>,
    /// Translation tables, defined before coding systems.
    pub translation_tables: Vec<TranslationTableSpec>,
    /// Coding systems, in order.
    pub coding_systems: Vec<CodingSystemSpec>,
    /// `(alias, target)` pairs.
    pub aliases: Vec<(String, String)>,
    /// Coding systems moved to the front of the detection priority.
    pub priority: Vec<String>,
    /// Categories moved to the front of the detection priority.
    pub category_priority: Vec<CodingCategory>,
    /// Coding system for file names.
    pub file_name_coding: Option<String>,
}

/// The coding-system table.
pub struct Registry {
    charsets: Charsets,
    systems: HashMap<String, Arc<CodingSystem>>,
    // Names of base definitions, in definition order.
    order: Vec<String>,
    aliases: HashMap<String, String>,
    programs: HashMap<String, Arc<dyn ByteCodeProgram>>,
    tables: HashMap<String, Arc<TranslationTable>>,
    priority: Vec<CodingCategory>,
    category_codings: HashMap<CodingCategory, String>,
    file_name_coding: String,
    scratch: ScratchPool,
}

impl Registry {
    /// A registry with the standard charsets and built-in coding systems.
    pub fn new() -> Self {
        let mut registry = Self::empty(Charsets::standard());
        for spec in builtin_specs() {
            let name = spec.name.clone();
            if let Err(err) = registry.define_coding_system(spec) {
                error!(name = %name, %err, "built-in coding system rejected");
            }
        }
        // Charset-table codings accept nearly any byte, so they only take
        // part in detection when configured explicitly.
        registry.category_codings.remove(&CodingCategory::Charset);
        registry
    }

    /// A registry over `charsets` with no coding systems.
    pub fn empty(charsets: Charsets) -> Self {
        Self {
            charsets,
            systems: HashMap::new(),
            order: Vec::new(),
            aliases: HashMap::new(),
            programs: HashMap::new(),
            tables: HashMap::new(),
            priority: CodingCategory::ALL.to_vec(),
            category_codings: HashMap::new(),
            file_name_coding: DEFAULT_FILE_NAME_CODING.to_string(),
            scratch: ScratchPool::default(),
        }
    }

    /// The charset table.
    pub fn charsets(&self) -> &Charsets {
        &self.charsets
    }

    /// Shared work-buffer pool.
    pub fn scratch(&self) -> &ScratchPool {
        &self.scratch
    }

    /// Adds a charset.
    pub fn define_charset(&mut self, spec: CharsetSpec) -> Result<CharsetId> {
        let name = spec.name.clone();
        let id = self.charsets.define(spec)?;
        debug!(name = %name, id = id.0, "defined charset");
        Ok(id)
    }

    /// Adds or replaces a translation table.
    pub fn define_translation_table(&mut self, spec: TranslationTableSpec) -> Result<()> {
        let invalid = |reason: &str| Error::InvalidDefinition {
            name: spec.name.clone(),
            reason: reason.to_string(),
        };
        if spec.name.is_empty() {
            return Err(invalid("empty name"));
        }
        if spec.entries.iter().any(|(from, _)| from.is_empty()) {
            return Err(invalid("entry with an empty source sequence"));
        }
        if spec
            .entries
            .iter()
            .flat_map(|(from, to)| from.iter().chain(to))
            .any(|&c| !is_valid_char(c))
        {
            return Err(invalid("entry outside the character space"));
        }
        if self.tables.contains_key(&spec.name) {
            warn!(name = %spec.name, "redefining translation table");
        }
        self.tables
            .insert(spec.name.clone(), Arc::new(TranslationTable::new(&spec)));
        Ok(())
    }

    /// A translation table by name.
    pub fn translation_table(&self, name: &str) -> Option<Arc<TranslationTable>> {
        self.tables.get(name).cloned()
    }

    /// Makes a conversion program available to program-driven codings.
    pub fn register_ccl_program(&mut self, name: &str, program: Arc<dyn ByteCodeProgram>) {
        if self.programs.insert(name.to_string(), program).is_some() {
            warn!(name, "replacing conversion program");
        }
    }

    /// Validates `spec` and adds the coding system, plus its `-unix`,
    /// `-dos` and `-mac` subsidiaries when the end-of-line convention is
    /// left to detection. The first system defined for a detection
    /// category is assigned to it.
    pub fn define_coding_system(&mut self, spec: CodingSystemSpec) -> Result<Arc<CodingSystem>> {
        if self.aliases.contains_key(&spec.name) {
            return Err(Error::DuplicateDefinition(spec.name));
        }
        for alias in &spec.aliases {
            let taken = self.systems.contains_key(alias)
                || self.aliases.get(alias).is_some_and(|target| *target != spec.name);
            if alias.is_empty() || *alias == spec.name || taken {
                return Err(Error::DuplicateDefinition(alias.clone()));
            }
        }
        let coding = self.build(&spec)?;
        if self.systems.contains_key(&spec.name) {
            warn!(name = %spec.name, "redefining coding system");
            self.remove_subsidiaries(&spec.name);
        } else {
            self.order.push(spec.name.clone());
        }
        let category = coding.category;
        let coding = self.install(coding);
        for alias in &spec.aliases {
            self.aliases.insert(alias.clone(), spec.name.clone());
        }
        self.category_codings
            .entry(category)
            .or_insert_with(|| spec.name.clone());
        debug!(name = %spec.name, %category, codec = coding.type_name(), "defined coding system");
        Ok(coding)
    }

    /// Replaces one field of a coding system and its subsidiaries.
    pub fn put_property(&mut self, name: &str, property: Property) -> Result<()> {
        let coding = self.get(name)?;
        let base = coding.base.clone().unwrap_or_else(|| coding.name.clone());
        let mut spec = coding.spec.clone();
        match property {
            Property::Mnemonic(c) => spec.mnemonic = Some(c),
            Property::DefaultChar(c) => spec.default_char = Some(c),
            Property::DecodeTranslation(table) => spec.decode_translation = table,
            Property::EncodeTranslation(table) => spec.encode_translation = table,
            Property::AsciiCompatible(flag) => spec.ascii_compatible = Some(flag),
            Property::PostReadHook(hook) => spec.post_read_hook = hook,
            Property::PreWriteHook(hook) => spec.pre_write_hook = hook,
        }
        let rebuilt = self.build(&spec)?;
        self.remove_subsidiaries(&base);
        self.install(rebuilt);
        Ok(())
    }

    /// Registers `alias` for the coding system `target`.
    pub fn define_alias(&mut self, alias: &str, target: &str) -> Result<()> {
        if alias.is_empty() || self.systems.contains_key(alias) || self.aliases.contains_key(alias) {
            return Err(Error::DuplicateDefinition(alias.to_string()));
        }
        let target = self.canonical_name(target)?;
        self.aliases.insert(alias.to_string(), target);
        Ok(())
    }

    /// Aliases of `name`, sorted.
    pub fn aliases_of(&self, name: &str) -> Vec<String> {
        let Ok(target) = self.canonical_name(name) else {
            return Vec::new();
        };
        let mut aliases: Vec<String> = self
            .aliases
            .iter()
            .filter(|(_, t)| **t == target)
            .map(|(alias, _)| alias.clone())
            .collect();
        aliases.sort();
        aliases
    }

    /// Registered name behind `name`, resolving aliases.
    pub fn canonical_name(&self, name: &str) -> Result<String> {
        self.get(name).map(|coding| coding.name.clone())
    }

    /// Coding system `name` or an alias of it.
    pub fn get(&self, name: &str) -> Result<Arc<CodingSystem>> {
        self.lookup(name)
            .ok_or_else(|| Error::UnknownCodingSystem(name.to_string()))
    }

    /// Like [`get`](Self::get), returning `None` for unknown names.
    ///
    /// An alias followed by an end-of-line suffix resolves to the target's
    /// subsidiary, so `utf8-dos` finds `utf-8-dos`.
    pub fn lookup(&self, name: &str) -> Option<Arc<CodingSystem>> {
        if let Some(coding) = self.systems.get(name) {
            return Some(Arc::clone(coding));
        }
        if let Some(target) = self.aliases.get(name) {
            return self.systems.get(target).cloned();
        }
        EolType::CONCRETE.iter().find_map(|eol| {
            let suffix = eol.suffix()?;
            let stem = name.strip_suffix(suffix)?;
            let target = self.aliases.get(stem)?;
            self.systems.get(&format!("{target}{suffix}")).cloned()
        })
    }

    /// The subsidiary of `coding` with end-of-line convention `eol`, or
    /// `coding` itself when it has a fixed convention or `eol` is undecided.
    pub fn eol_variant(&self, coding: &Arc<CodingSystem>, eol: EolType) -> Arc<CodingSystem> {
        let Some(suffix) = eol.suffix() else {
            return Arc::clone(coding);
        };
        if coding.eol != EolType::AutoDetect {
            return Arc::clone(coding);
        }
        self.systems
            .get(&format!("{}{}", coding.name, suffix))
            .cloned()
            .unwrap_or_else(|| Arc::clone(coding))
    }

    /// Base coding systems in definition order; subsidiaries are omitted.
    pub fn coding_systems(&self) -> Vec<Arc<CodingSystem>> {
        self.order
            .iter()
            .filter_map(|name| self.systems.get(name).cloned())
            .collect()
    }

    /// Moves the category of each named coding system to the front of the
    /// detection priority, in the given order, and assigns the system to it.
    pub fn set_coding_priority(&mut self, names: &[&str]) -> Result<()> {
        let codings = names
            .iter()
            .map(|name| self.get(name))
            .collect::<Result<Vec<_>>>()?;
        let mut front = Vec::with_capacity(codings.len());
        for coding in codings {
            let base = coding.base.clone().unwrap_or_else(|| coding.name.clone());
            self.category_codings.insert(coding.category, base);
            front.push(coding.category);
        }
        self.set_category_priority(&front);
        Ok(())
    }

    /// Moves `categories` to the front of the detection priority.
    pub fn set_category_priority(&mut self, categories: &[CodingCategory]) {
        let mut priority: Vec<CodingCategory> = Vec::with_capacity(CodingCategory::ALL.len());
        for &category in categories.iter().chain(&self.priority) {
            if !priority.contains(&category) {
                priority.push(category);
            }
        }
        debug!(?priority, "category priority changed");
        self.priority = priority;
    }

    /// Detection categories, highest priority first.
    pub fn category_priority(&self) -> &[CodingCategory] {
        &self.priority
    }

    /// Coding system assigned to `category`.
    pub fn category_coding(&self, category: CodingCategory) -> Option<Arc<CodingSystem>> {
        self.category_codings
            .get(&category)
            .and_then(|name| self.systems.get(name))
            .cloned()
    }

    /// Assigned categories with their coding systems, in priority order.
    pub fn category_codings(&self) -> Vec<(CodingCategory, Arc<CodingSystem>)> {
        self.priority
            .iter()
            .filter_map(|&category| {
                self.category_coding(category)
                    .map(|coding| (category, coding))
            })
            .collect()
    }

    /// Coding system used for file names.
    pub fn file_name_coding(&self) -> &str {
        &self.file_name_coding
    }

    /// Sets the coding system used for file names.
    pub fn set_file_name_coding(&mut self, name: &str) -> Result<()> {
        self.file_name_coding = self.canonical_name(name)?;
        Ok(())
    }

    /// Applies a JSON configuration document.
    ///
    /// Sections are applied in dependency order; the first failing entry
    /// stops loading, leaving earlier entries in place.
    pub fn load_config(&mut self, json: &str) -> Result<()> {
        let config: RegistryConfig = serde_json::from_str(json)?;
        self.apply_config(config)
    }

    /// Reads and applies a JSON configuration file.
    pub fn load_config_file(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)?;
        debug!(path = %path.display(), "loading configuration");
        self.load_config(&json)
    }

    /// Applies already-parsed definitions.
    pub fn apply_config(&mut self, config: RegistryConfig) -> Result<()> {
        for spec in config.charsets {
            self.define_charset(spec)?;
        }
        for spec in config.translation_tables {
            self.define_translation_table(spec)?;
        }
        for spec in config.coding_systems {
            self.define_coding_system(spec)?;
        }
        for (alias, target) in &config.aliases {
            self.define_alias(alias, target)?;
        }
        if !config.priority.is_empty() {
            let names: Vec<&str> = config.priority.iter().map(String::as_str).collect();
            self.set_coding_priority(&names)?;
        }
        if !config.category_priority.is_empty() {
            self.set_category_priority(&config.category_priority);
        }
        if let Some(name) = &config.file_name_coding {
            self.set_file_name_coding(name)?;
        }
        Ok(())
    }

    /// A streaming decoder for `name` with default options.
    pub fn decoder(&self, name: &str) -> Result<StreamingDecoder<'_>> {
        self.decoder_with(name, ConvertOptions::default())
    }

    /// A streaming decoder for `name`.
    pub fn decoder_with(&self, name: &str, options: ConvertOptions) -> Result<StreamingDecoder<'_>> {
        Ok(StreamingDecoder::new(self, self.get(name)?, options))
    }

    /// A streaming encoder for `name` with default options.
    pub fn encoder(&self, name: &str) -> Result<StreamingEncoder<'_>> {
        self.encoder_with(name, ConvertOptions::default())
    }

    /// A streaming encoder for `name`.
    pub fn encoder_with(&self, name: &str, options: ConvertOptions) -> Result<StreamingEncoder<'_>> {
        Ok(StreamingEncoder::new(self, self.get(name)?, options))
    }

    fn install(&mut self, coding: CodingSystem) -> Arc<CodingSystem> {
        if coding.eol == EolType::AutoDetect {
            for sub in subsidiaries(&coding) {
                self.systems.insert(sub.name.clone(), Arc::new(sub));
            }
        }
        let coding = Arc::new(coding);
        self.systems
            .insert(coding.name.clone(), Arc::clone(&coding));
        coding
    }

    fn remove_subsidiaries(&mut self, base: &str) {
        self.systems
            .retain(|_, coding| coding.base.as_deref() != Some(base));
    }

    fn charset_id(&self, coding: &str, name: &str) -> Result<CharsetId> {
        self.charsets
            .lookup(name)
            .ok_or_else(|| Error::InvalidDefinition {
                name: coding.to_string(),
                reason: format!("unknown charset `{name}`"),
            })
    }

    fn program(&self, name: &str) -> Result<Arc<dyn ByteCodeProgram>> {
        self.programs
            .get(name)
            .cloned()
            .ok_or_else(|| Error::UnknownCclProgram(name.to_string()))
    }

    fn table(&self, coding: &str, name: Option<&String>) -> Result<Option<Arc<TranslationTable>>> {
        name.map(|name| {
            self.translation_table(name)
                .ok_or_else(|| Error::InvalidDefinition {
                    name: coding.to_string(),
                    reason: format!("unknown translation table `{name}`"),
                })
        })
        .transpose()
    }

    /// Resolves a definition into a coding system, without installing it.
    fn build(&self, spec: &CodingSystemSpec) -> Result<CodingSystem> {
        let name = spec.name.as_str();
        let invalid = |reason: String| Error::InvalidDefinition {
            name: name.to_string(),
            reason,
        };
        if name.is_empty() || name.chars().any(char::is_whitespace) {
            return Err(invalid("name must be non-empty without whitespace".into()));
        }
        if EolType::CONCRETE
            .iter()
            .filter_map(|eol| eol.suffix())
            .any(|suffix| name.ends_with(suffix))
            && spec.eol == EolType::AutoDetect
        {
            return Err(invalid("an end-of-line suffix requires a fixed end-of-line type".into()));
        }
        let mut charsets = spec
            .charsets
            .iter()
            .map(|c| self.charset_id(name, c))
            .collect::<Result<Vec<_>>>()?;
        let cs = &self.charsets;

        let kind = match &spec.codec {
            CodecSpec::Utf8 { bom, extended } => {
                if charsets.is_empty() {
                    let default = if *extended { "emacs" } else { "unicode" };
                    charsets.push(self.charset_id(name, default)?);
                }
                CodecKind::Utf8 {
                    bom: *bom,
                    extended: *extended,
                }
            }
            CodecSpec::Utf16 { bom, endian } => {
                if charsets.is_empty() {
                    charsets.push(self.charset_id(name, "unicode")?);
                }
                CodecKind::Utf16 {
                    bom: *bom,
                    endian: *endian,
                }
            }
            CodecSpec::Iso2022 {
                flags,
                initial,
                request,
            } => {
                if initial.len() > 4 {
                    return Err(invalid(format!("{} initial designations for 4 registers", initial.len())));
                }
                let mut designations = [None; 4];
                for (reg, charset) in initial.iter().enumerate() {
                    if let Some(charset) = charset {
                        designations[reg] = Some(self.charset_id(name, charset)?);
                    }
                }
                if charsets.is_empty() {
                    charsets = cs
                        .ids()
                        .filter(|&id| cs.iso_registration(id).is_some())
                        .collect();
                }
                for &id in designations.iter().flatten() {
                    if !charsets.contains(&id) {
                        charsets.push(id);
                    }
                }
                if let Some(&id) = charsets
                    .iter()
                    .find(|&&id| cs.iso_registration(id).is_none())
                {
                    return Err(invalid(format!(
                        "charset `{}` has no ISO-2022 registration",
                        cs.name(id)
                    )));
                }
                let mut requests = Vec::with_capacity(request.len());
                for (charset, reg) in request {
                    if *reg > 3 {
                        return Err(invalid(format!("register {reg} for `{charset}` not in 0..=3")));
                    }
                    requests.push((self.charset_id(name, charset)?, *reg));
                }
                CodecKind::Iso2022(Iso2022Params {
                    flags: *flags,
                    initial: designations,
                    request: requests,
                })
            }
            CodecSpec::EmacsMule => {
                if charsets.is_empty() {
                    charsets = cs
                        .ids()
                        .filter(|&id| {
                            cs.name(id) == "ascii" || cs.emacs_mule_id(id).is_some()
                        })
                        .collect();
                }
                CodecKind::EmacsMule
            }
            CodecSpec::Sjis => {
                if charsets.is_empty() {
                    for c in ["ascii", "katakana-jisx0201", "japanese-jisx0208"] {
                        charsets.push(self.charset_id(name, c)?);
                    }
                }
                if charsets.len() > 4 {
                    return Err(invalid("Shift-JIS takes at most 4 charsets".into()));
                }
                CodecKind::Sjis
            }
            CodecSpec::Big5 => {
                if charsets.is_empty() {
                    for c in ["ascii", "big5"] {
                        charsets.push(self.charset_id(name, c)?);
                    }
                }
                if charsets.len() != 2 {
                    return Err(invalid("Big5 takes exactly 2 charsets".into()));
                }
                CodecKind::Big5
            }
            CodecSpec::CharsetTable => {
                if charsets.is_empty() {
                    return Err(invalid("charset-table codec needs at least one charset".into()));
                }
                CodecKind::CharsetTable(Arc::new(CharsetTable::build(cs, &charsets)))
            }
            CodecSpec::Ccl {
                decoder,
                encoder,
                valid_codes,
            } => {
                let mut codes = Box::new([valid_codes.is_empty(); 256]);
                for &(lo, hi) in valid_codes {
                    if lo > hi {
                        return Err(invalid(format!("valid code range {lo:#x}..{hi:#x} is empty")));
                    }
                    codes[usize::from(lo)..=usize::from(hi)]
                        .iter_mut()
                        .for_each(|v| *v = true);
                }
                CodecKind::Ccl(CclParams {
                    decoder: self.program(decoder)?,
                    encoder: self.program(encoder)?,
                    valid_codes: codes,
                })
            }
            CodecSpec::RawText => CodecKind::RawText,
            CodecSpec::Undecided {
                prefer_utf8,
                inhibit_null_byte_detection,
                inhibit_iso_escape_detection,
            } => CodecKind::Undecided {
                prefer_utf8: *prefer_utf8,
                inhibit_null_byte_detection: *inhibit_null_byte_detection,
                inhibit_iso_escape_detection: *inhibit_iso_escape_detection,
            },
        };

        let default_char = spec.default_char.unwrap_or(u32::from(b'?'));
        if !is_valid_char(default_char) {
            return Err(invalid(format!("default char {default_char:#x} out of range")));
        }
        let ascii_compatible = spec
            .ascii_compatible
            .unwrap_or_else(|| default_ascii_compatible(&kind, cs, &charsets));
        Ok(CodingSystem {
            name: spec.name.clone(),
            base: None,
            category: category_of(&kind, cs),
            mnemonic: spec.mnemonic.unwrap_or_else(|| default_mnemonic(&kind)),
            kind,
            charsets,
            ascii_compatible,
            default_char,
            decode_table: self.table(name, spec.decode_translation.as_ref())?,
            encode_table: self.table(name, spec.encode_translation.as_ref())?,
            eol: spec.eol,
            post_read_hook: spec.post_read_hook.clone(),
            pre_write_hook: spec.pre_write_hook.clone(),
            spec: spec.clone(),
        })
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("charsets", &self.charsets.len())
            .field("coding_systems", &self.order.len())
            .field("aliases", &self.aliases.len())
            .field("priority", &self.priority)
            .field("file_name_coding", &self.file_name_coding)
            .finish()
    }
}

fn subsidiaries(base: &CodingSystem) -> Vec<CodingSystem> {
    EolType::CONCRETE
        .iter()
        .filter_map(|&eol| {
            let suffix = eol.suffix()?;
            let mut sub = base.clone();
            sub.name = format!("{}{}", base.name, suffix);
            sub.base = Some(base.name.clone());
            sub.eol = eol;
            Some(sub)
        })
        .collect()
}

fn category_of(kind: &CodecKind, charsets: &Charsets) -> CodingCategory {
    match kind {
        CodecKind::Utf8 { bom, .. } => match bom {
            BomPolicy::NoBom => CodingCategory::Utf8Nosig,
            BomPolicy::WithBom => CodingCategory::Utf8Sig,
            BomPolicy::AutoDetectBom => CodingCategory::Utf8Auto,
        },
        CodecKind::Utf16 { bom, endian } => match (bom, endian) {
            (BomPolicy::AutoDetectBom, _) => CodingCategory::Utf16Auto,
            (BomPolicy::WithBom, Endian::Big) => CodingCategory::Utf16Be,
            (BomPolicy::WithBom, Endian::Little) => CodingCategory::Utf16Le,
            (BomPolicy::NoBom, Endian::Big) => CodingCategory::Utf16BeNosig,
            (BomPolicy::NoBom, Endian::Little) => CodingCategory::Utf16LeNosig,
        },
        CodecKind::Iso2022(params) => {
            let flags = params.flags;
            let shifts = flags.contains(Iso2022Flags::LOCKING_SHIFT)
                || flags.contains(Iso2022Flags::SINGLE_SHIFT);
            if params.seven_bits() {
                if shifts {
                    CodingCategory::Iso7Else
                } else if flags.contains(Iso2022Flags::FULL_SUPPORT) {
                    CodingCategory::Iso7
                } else {
                    CodingCategory::Iso7Tight
                }
            } else if flags.contains(Iso2022Flags::LOCKING_SHIFT)
                || flags.contains(Iso2022Flags::FULL_SUPPORT)
            {
                CodingCategory::Iso8Else
            } else {
                match params.initial[1].map(|id| charsets.dimension(id)) {
                    Some(1) => CodingCategory::Iso8_1,
                    Some(2) => CodingCategory::Iso8_2,
                    _ => CodingCategory::Iso8Else,
                }
            }
        }
        CodecKind::EmacsMule => CodingCategory::EmacsMule,
        CodecKind::Sjis => CodingCategory::Sjis,
        CodecKind::Big5 => CodingCategory::Big5,
        CodecKind::CharsetTable(_) => CodingCategory::Charset,
        CodecKind::Ccl(_) => CodingCategory::Ccl,
        CodecKind::RawText => CodingCategory::RawText,
        CodecKind::Undecided { .. } => CodingCategory::Undecided,
    }
}

fn default_ascii_compatible(kind: &CodecKind, charsets: &Charsets, list: &[CharsetId]) -> bool {
    match kind {
        CodecKind::Utf16 { .. } | CodecKind::Ccl(_) => false,
        CodecKind::Iso2022(params) => {
            let ascii = charsets.lookup("ascii");
            params.initial[0].is_some()
                && params.initial[0] == ascii
                && !params.seven_bits()
                && !params.flags.contains(Iso2022Flags::LOCKING_SHIFT)
        }
        CodecKind::CharsetTable(_) => list
            .first()
            .is_some_and(|&id| charsets.ascii_compatible(id)),
        _ => true,
    }
}

fn default_mnemonic(kind: &CodecKind) -> char {
    match kind {
        CodecKind::Utf8 { .. } | CodecKind::Utf16 { .. } => 'U',
        CodecKind::Iso2022(_) => 'I',
        CodecKind::EmacsMule => 'M',
        CodecKind::Sjis => 'S',
        CodecKind::Big5 => 'B',
        CodecKind::CharsetTable(_) => 'C',
        CodecKind::Ccl(_) => 'c',
        CodecKind::RawText => 't',
        CodecKind::Undecided { .. } => '-',
    }
}

fn iso2022(flags: Iso2022Flags, initial: &[&str]) -> CodecSpec {
    CodecSpec::Iso2022 {
        flags,
        initial: initial.iter().map(|c| Some(c.to_string())).collect(),
        request: Vec::new(),
    }
}

fn utf16(bom: BomPolicy, endian: Endian) -> CodecSpec {
    CodecSpec::Utf16 { bom, endian }
}

fn builtin_specs() -> Vec<CodingSystemSpec> {
    use Iso2022Flags as F;

    let seven_bit = F::SEVEN_BITS | F::DESIGNATION | F::RESET_AT_EOL | F::RESET_AT_CNTL;
    let utf8 = |bom, extended| CodecSpec::Utf8 { bom, extended };
    vec![
        CodingSystemSpec::new(
            "undecided",
            CodecSpec::Undecided {
                prefer_utf8: true,
                inhibit_null_byte_detection: false,
                inhibit_iso_escape_detection: false,
            },
        ),
        CodingSystemSpec::new("raw-text", CodecSpec::RawText),
        CodingSystemSpec::new("no-conversion", CodecSpec::RawText)
            .eol(EolType::Unix)
            .mnemonic('=')
            .aliases(["binary"]),
        CodingSystemSpec::new("utf-8", utf8(BomPolicy::NoBom, false)).aliases(["utf8", "mule-utf-8"]),
        CodingSystemSpec::new("utf-8-with-signature", utf8(BomPolicy::WithBom, false)),
        CodingSystemSpec::new("utf-8-auto", utf8(BomPolicy::AutoDetectBom, false)),
        CodingSystemSpec::new("utf-8-emacs", utf8(BomPolicy::NoBom, true)),
        CodingSystemSpec::new("utf-16", utf16(BomPolicy::AutoDetectBom, Endian::Big))
            .aliases(["utf16"]),
        CodingSystemSpec::new("utf-16le", utf16(BomPolicy::NoBom, Endian::Little)),
        CodingSystemSpec::new("utf-16be", utf16(BomPolicy::NoBom, Endian::Big)),
        CodingSystemSpec::new("utf-16le-with-signature", utf16(BomPolicy::WithBom, Endian::Little)),
        CodingSystemSpec::new("utf-16be-with-signature", utf16(BomPolicy::WithBom, Endian::Big)),
        CodingSystemSpec::new(
            "iso-2022-7bit",
            iso2022(seven_bit | F::COMPOSITION | F::FULL_SUPPORT, &["ascii"]),
        )
        .mnemonic('J'),
        CodingSystemSpec::new(
            "iso-2022-7bit-lock",
            iso2022(
                seven_bit | F::LOCKING_SHIFT | F::COMPOSITION | F::FULL_SUPPORT,
                &["ascii"],
            ),
        )
        .mnemonic('i')
        .aliases(["iso-2022-int-1"]),
        CodingSystemSpec::new(
            "iso-2022-8bit-ss2",
            iso2022(F::DESIGNATION | F::SINGLE_SHIFT | F::FULL_SUPPORT, &["ascii"]),
        ),
        CodingSystemSpec::new("iso-2022-jp", iso2022(seven_bit, &["ascii"]))
            .charsets([
                "ascii",
                "japanese-jisx0208",
                "japanese-jisx0208-1978",
                "latin-jisx0201",
            ])
            .mnemonic('J')
            .aliases(["junet"]),
        CodingSystemSpec::new(
            "iso-latin-1",
            iso2022(Iso2022Flags::default(), &["ascii", "latin-iso8859-1"]),
        )
        .charsets(["ascii", "latin-iso8859-1"])
        .mnemonic('1')
        .aliases(["latin-1"]),
        CodingSystemSpec::new(
            "euc-jp",
            iso2022(
                F::SINGLE_SHIFT,
                &[
                    "ascii",
                    "japanese-jisx0208",
                    "katakana-jisx0201",
                    "japanese-jisx0212",
                ],
            ),
        )
        .mnemonic('E')
        .aliases(["euc-japan"]),
        CodingSystemSpec::new(
            "compound-text",
            iso2022(F::DESIGNATION | F::FULL_SUPPORT, &["ascii", "latin-iso8859-1"]),
        )
        .mnemonic('x')
        .aliases(["ctext", "x-ctext"]),
        CodingSystemSpec::new("iso-8859-1", CodecSpec::CharsetTable).charsets(["iso-8859-1"]),
        CodingSystemSpec::new("shift_jis", CodecSpec::Sjis).aliases(["sjis", "shift-jis"]),
        CodingSystemSpec::new("big5", CodecSpec::Big5).aliases(["cn-big5"]),
        CodingSystemSpec::new("emacs-mule", CodecSpec::EmacsMule),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtins_and_subsidiaries() {
        let registry = Registry::new();
        for spec in builtin_specs() {
            let coding = registry.get(&spec.name).unwrap();
            assert_eq!(coding.base, None);
            if spec.eol == EolType::AutoDetect {
                let dos = registry.get(&format!("{}-dos", spec.name)).unwrap();
                assert_eq!(dos.eol, EolType::Dos);
                assert_eq!(dos.base.as_deref(), Some(spec.name.as_str()));
            }
        }
        assert!(registry.lookup("no-conversion-unix").is_none());
        assert_eq!(registry.coding_systems().len(), builtin_specs().len());
    }

    #[test]
    fn test_default_category_assignment() {
        let registry = Registry::new();
        let name = |category| registry.category_coding(category).map(|c| c.name.clone());
        assert_eq!(name(CodingCategory::Iso7).as_deref(), Some("iso-2022-7bit"));
        assert_eq!(name(CodingCategory::Iso7Tight).as_deref(), Some("iso-2022-jp"));
        assert_eq!(name(CodingCategory::Iso7Else).as_deref(), Some("iso-2022-7bit-lock"));
        assert_eq!(name(CodingCategory::Iso8_1).as_deref(), Some("iso-latin-1"));
        assert_eq!(name(CodingCategory::Iso8_2).as_deref(), Some("euc-jp"));
        assert_eq!(name(CodingCategory::Iso8Else).as_deref(), Some("iso-2022-8bit-ss2"));
        assert_eq!(name(CodingCategory::Utf8Nosig).as_deref(), Some("utf-8"));
        assert_eq!(name(CodingCategory::Utf16LeNosig).as_deref(), Some("utf-16le"));
        assert_eq!(name(CodingCategory::Charset), None);
        assert_eq!(name(CodingCategory::Ccl), None);
    }

    #[test]
    fn test_aliases_resolve_with_eol_suffix() {
        let registry = Registry::new();
        assert_eq!(registry.get("utf8").unwrap().name, "utf-8");
        assert_eq!(registry.get("utf8-dos").unwrap().name, "utf-8-dos");
        assert_eq!(registry.get("binary").unwrap().name, "no-conversion");
        assert_eq!(registry.aliases_of("utf-8"), vec!["mule-utf-8", "utf8"]);
        assert!(matches!(
            registry.get("no-such-coding"),
            Err(Error::UnknownCodingSystem(_))
        ));
    }

    #[test]
    fn test_define_alias_rejects_duplicates() {
        let mut registry = Registry::new();
        registry.define_alias("u8", "utf8").unwrap();
        assert_eq!(registry.canonical_name("u8").unwrap(), "utf-8");
        assert!(matches!(
            registry.define_alias("u8", "big5"),
            Err(Error::DuplicateDefinition(_))
        ));
        assert!(registry.define_alias("utf-8", "big5").is_err());
        assert!(registry.define_alias("x", "missing").is_err());
    }

    #[test]
    fn test_invalid_definitions() {
        let mut registry = Registry::new();
        let unknown_charset = CodingSystemSpec::new("bad", CodecSpec::Sjis).charsets(["nope"]);
        assert!(matches!(
            registry.define_coding_system(unknown_charset),
            Err(Error::InvalidDefinition { .. })
        ));
        let unregistered = CodingSystemSpec::new("bad", iso2022(Iso2022Flags::DESIGNATION, &["ascii"]))
            .charsets(["ascii", "big5"]);
        assert!(registry.define_coding_system(unregistered).is_err());
        let empty_table = CodingSystemSpec::new("bad", CodecSpec::CharsetTable);
        assert!(registry.define_coding_system(empty_table).is_err());
        let suffixed = CodingSystemSpec::new("bad-unix", CodecSpec::RawText);
        assert!(registry.define_coding_system(suffixed).is_err());
        let bad_default = CodingSystemSpec {
            default_char: Some(0x40_0000),
            ..CodingSystemSpec::new("bad", CodecSpec::RawText)
        };
        assert!(registry.define_coding_system(bad_default).is_err());
        assert!(registry.lookup("bad").is_none());
    }

    #[test]
    fn test_iso_defaults() {
        let registry = Registry::new();
        let euc = registry.get("euc-jp").unwrap();
        assert!(euc.ascii_compatible);
        assert_eq!(euc.category, CodingCategory::Iso8_2);
        let jp = registry.get("iso-2022-jp").unwrap();
        assert!(!jp.ascii_compatible);
        assert_eq!(jp.charsets.len(), 4);
        let full = registry.get("iso-2022-7bit").unwrap();
        let charsets = registry.charsets();
        assert!(full
            .charsets
            .iter()
            .all(|&id| charsets.iso_registration(id).is_some()));
        assert!(full.charsets.contains(&charsets.lookup("chinese-gb2312").unwrap()));
    }

    #[test]
    fn test_put_property_updates_subsidiaries() {
        let mut registry = Registry::new();
        registry
            .put_property("utf-8-dos", Property::DefaultChar(0x2A))
            .unwrap();
        assert_eq!(registry.get("utf-8").unwrap().default_char, 0x2A);
        assert_eq!(registry.get("utf-8-unix").unwrap().default_char, 0x2A);
        assert!(registry
            .put_property("utf-8", Property::DecodeTranslation(Some("missing".into())))
            .is_err());
        assert!(registry.get("utf-8").unwrap().decode_table.is_none());
    }

    #[test]
    fn test_coding_priority_moves_category_front() {
        let mut registry = Registry::new();
        registry.set_coding_priority(&["shift_jis", "utf-8"]).unwrap();
        assert_eq!(
            &registry.category_priority()[..2],
            &[CodingCategory::Sjis, CodingCategory::Utf8Nosig]
        );
        assert_eq!(registry.category_priority().len(), CodingCategory::ALL.len());
        assert_eq!(registry.category_codings()[0].1.name, "shift_jis");

        registry.set_coding_priority(&["iso-8859-1-unix"]).unwrap();
        assert_eq!(
            registry.category_coding(CodingCategory::Charset).unwrap().name,
            "iso-8859-1"
        );
    }

    #[test]
    fn test_eol_variant() {
        let registry = Registry::new();
        let utf8 = registry.get("utf-8").unwrap();
        assert_eq!(registry.eol_variant(&utf8, EolType::Mac).name, "utf-8-mac");
        assert_eq!(registry.eol_variant(&utf8, EolType::AutoDetect).name, "utf-8");
        let fixed = registry.get("utf-8-unix").unwrap();
        assert_eq!(registry.eol_variant(&fixed, EolType::Dos).name, "utf-8-unix");
    }

    #[test]
    fn test_load_config() {
        let mut registry = Registry::new();
        registry
            .load_config(
                r#"{
                    "translation_tables": [
                        {"name": "upcase-a", "entries": [[[97], [65]]]}
                    ],
                    "coding_systems": [
                        {"name": "my-latin", "codec": {"type": "charset-table"},
                         "charsets": ["iso-8859-1"], "eol": "dos",
                         "decode_translation": "upcase-a"}
                    ],
                    "aliases": [["mine", "my-latin"]],
                    "file_name_coding": "latin-1"
                }"#,
            )
            .unwrap();
        let coding = registry.get("mine").unwrap();
        assert_eq!(coding.name, "my-latin");
        assert_eq!(coding.eol, EolType::Dos);
        assert!(coding.decode_table.is_some());
        assert!(registry.lookup("my-latin-unix").is_none());
        assert_eq!(registry.file_name_coding(), "iso-latin-1");

        assert!(matches!(registry.load_config("{"), Err(Error::Config(_))));
        assert!(matches!(
            registry.load_config_file("/nonexistent/fast-coding.json"),
            Err(Error::Io(_))
        ));
    }

    #[test]
    fn test_redefinition_replaces() {
        let mut registry = Registry::new();
        let spec = CodingSystemSpec::new("utf-8", CodecSpec::Utf8 {
            bom: BomPolicy::NoBom,
            extended: false,
        })
        .eol(EolType::Unix);
        registry.define_coding_system(spec).unwrap();
        assert!(registry.lookup("utf-8-dos").is_none());
        assert_eq!(registry.get("utf8").unwrap().eol, EolType::Unix);
        assert_eq!(registry.coding_systems().len(), builtin_specs().len());
    }
}

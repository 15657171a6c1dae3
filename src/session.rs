//! Line-oriented command session over an [`Explorer`].
//!
//! Each command produces a block of text; nothing is printed directly, so
//! the same session drives the interactive loop, batch mode and tests.

use std::path::Path;

use magnifier_core::{
    DirectCallResolver, Explorer, ExplorerConfig, FunctionKind, SubstitutionError, SubstitutionKind,
    SubstitutionObserver, SubstitutionSite, ValueId,
};
use magnifier_ir::{IrContext, OptLevel, ValueRef, print_inst};
use tracing::debug;

use crate::pseudo_c::PseudoCDecompiler;

pub const HELP: &str = "\
lm <path> - Load/open a module in the text format
lf - List all functions in all open modules
lfa - List all functions, including generated ones
pf <function_id> - Print function
ic <instruction_id> - Inline function call
dc <instruction_id> <function_id> - Devirtualize function
sv <id> <val> - Substitute with value
o1 <id> - Optimize function using optimization level -O1
o2 <id> - Optimize function using optimization level -O2
o3 <id> - Optimize function using optimization level -O3
df! <function_id> - Delete function
dec <id> - Decompile function with id
help - Show this list
exit - Leave the session
";

/// What the caller should do after a command.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    Output(String),
    Exit,
}

impl Outcome {
    fn text(text: impl Into<String>) -> Self {
        Outcome::Output(text.into())
    }
}

fn kind_label(kind: SubstitutionKind) -> &'static str {
    match kind {
        SubstitutionKind::ReturnValue => "Return value",
        SubstitutionKind::Argument => "Argument",
        SubstitutionKind::ConstantFolding => "Constant folding",
        SubstitutionKind::ValueSubstitution => "Value substitution",
        SubstitutionKind::FunctionDevirtualization => "Function devirtualization",
    }
}

/// Accepts every substitution and writes one line per event.
struct ReportingObserver<'a> {
    out: &'a mut String,
}

impl SubstitutionObserver for ReportingObserver<'_> {
    fn perform_substitution(&mut self, ctx: &mut IrContext, site: &SubstitutionSite) -> ValueRef {
        self.out.push_str(&format!(
            "perform substitution: {} : {}\n",
            print_inst(ctx, site.marker),
            kind_label(site.kind)
        ));
        site.new
    }
}

pub struct Session {
    explorer: Explorer,
    decompiler: PseudoCDecompiler,
}

impl Session {
    pub fn new(config: ExplorerConfig) -> Self {
        Self {
            explorer: Explorer::with_config(config),
            decompiler: PseudoCDecompiler,
        }
    }

    pub fn explorer(&self) -> &Explorer {
        &self.explorer
    }

    /// Load a module from disk. The path doubles as the module name.
    pub fn load_file(&mut self, path: &Path) -> Result<(), String> {
        let text = std::fs::read_to_string(path)
            .map_err(|_| format!("Unable to open file: {}", path.display()))?;
        let name = path.display().to_string();
        self.explorer
            .load_module(&name, &text)
            .map_err(|e| format!("Unable to parse file: {} ({e})", path.display()))?;
        debug!(module = name, "loaded module");
        Ok(())
    }

    /// Run one command line.
    pub fn execute(&mut self, line: &str) -> Outcome {
        let args: Vec<&str> = line.split_whitespace().collect();
        let Some(&command) = args.first() else {
            return Outcome::text("");
        };
        debug!(command, "executing");

        match command {
            "exit" => Outcome::Exit,
            "help" => Outcome::text(HELP),
            "lm" => Outcome::Output(self.load_command(&args)),
            "lf" | "lfa" => Outcome::Output(self.list_functions(&args, command == "lfa")),
            "pf" => Outcome::Output(self.print_command(&args)),
            "ic" => Outcome::Output(self.inline_command(&args)),
            "dc" => Outcome::Output(self.devirtualize_command(&args)),
            "sv" => Outcome::Output(self.substitute_command(&args)),
            "o1" => Outcome::Output(self.optimize_command(&args, OptLevel::O1)),
            "o2" => Outcome::Output(self.optimize_command(&args, OptLevel::O2)),
            "o3" => Outcome::Output(self.optimize_command(&args, OptLevel::O3)),
            "df!" => Outcome::Output(self.delete_command(&args)),
            "dec" => Outcome::Output(self.decompile_command(&args)),
            _ => Outcome::Output(format!("Invalid Command: {command}\n")),
        }
    }

    fn printed(&self, id: ValueId) -> String {
        self.explorer
            .print_function(id)
            .unwrap_or_else(|| format!("Function not found: {id}\n"))
    }

    fn load_command(&mut self, args: &[&str]) -> String {
        let [_, path] = args else {
            return "Usage: lm <path> - Load/open a module in the text format\n".to_owned();
        };
        match self.load_file(Path::new(path)) {
            Ok(()) => format!("Successfully loaded: {path}\n"),
            Err(message) => format!("{message}\n"),
        }
    }

    fn list_functions(&self, args: &[&str], include_generated: bool) -> String {
        if args.len() != 1 {
            return if include_generated {
                "Usage: lfa - List all functions, including generated ones\n"
            } else {
                "Usage: lf - List all functions in all open modules\n"
            }
            .to_owned();
        }
        let ctx = self.explorer.context();
        let mut out = String::new();
        self.explorer.for_each_function(include_generated, |id, func| {
            let marker = match self.explorer.function_kind(func) {
                FunctionKind::Original => "",
                FunctionKind::Generated => " (generated)",
            };
            out.push_str(&format!("{id} {}{marker}\n", ctx.func_name(func)));
        });
        out
    }

    fn print_command(&self, args: &[&str]) -> String {
        let [_, id] = args else {
            return "Usage: pf <function_id> - Print function\n".to_owned();
        };
        match id.parse() {
            Ok(id) => self.printed(id),
            Err(_) => "Invalid args\n".to_owned(),
        }
    }

    fn inline_command(&mut self, args: &[&str]) -> String {
        let [_, id] = args else {
            return "Usage: ic <instruction_id> - Inline function call\n".to_owned();
        };
        let Ok(id) = id.parse::<ValueId>() else {
            return "Invalid args\n".to_owned();
        };
        let mut out = String::new();
        let result = self.explorer.inline_function_call(
            id,
            &mut DirectCallResolver,
            &mut ReportingObserver { out: &mut out },
        );
        match result {
            Ok(new_id) => out.push_str(&self.printed(new_id)),
            Err(e) => out.push_str(&format!(
                "Inline function call failed for id: {id} (error: {})\n",
                e.error
            )),
        }
        out
    }

    fn devirtualize_command(&mut self, args: &[&str]) -> String {
        let [_, inst, func] = args else {
            return "Usage: dc <instruction_id> <function_id> - Devirtualize function\n".to_owned();
        };
        let (Ok(inst), Ok(func)) = (inst.parse::<ValueId>(), func.parse::<ValueId>()) else {
            return "Invalid args\n".to_owned();
        };
        let mut out = String::new();
        let result =
            self.explorer
                .devirtualize_function(inst, func, &mut ReportingObserver { out: &mut out });
        match result {
            Ok(new_id) => out.push_str(&self.printed(new_id)),
            Err(e) => out.push_str(&format!(
                "Devirtualize function call failed for id: {inst} (error: {})\n",
                e.error
            )),
        }
        out
    }

    /// `sv` first treats the id as an instruction and falls back to an
    /// argument only when no instruction has that id.
    fn substitute_command(&mut self, args: &[&str]) -> String {
        let [_, id, value] = args else {
            return "Usage: sv <id> <val> - Substitute with value\n".to_owned();
        };
        let (Ok(id), Ok(value)) = (id.parse::<ValueId>(), value.parse::<i64>()) else {
            return "Invalid args\n".to_owned();
        };
        let mut out = String::new();
        let mut observer = ReportingObserver { out: &mut out };
        let result = match self
            .explorer
            .substitute_instruction_with_value(id, value, &mut observer)
        {
            Err(e) if e.error == SubstitutionError::IdNotFound => self
                .explorer
                .substitute_argument_with_value(id, value, &mut observer),
            result => result,
        };
        match result {
            Ok(new_id) => out.push_str(&self.printed(new_id)),
            Err(e) => out.push_str(&format!(
                "Substitute value failed for id: {id} (error: {})\n",
                e.error
            )),
        }
        out
    }

    fn optimize_command(&mut self, args: &[&str], level: OptLevel) -> String {
        let [_, id] = args else {
            return format!(
                "Usage: o{n} <id> - Optimize function using optimization level -O{n}\n",
                n = level.number()
            );
        };
        let Ok(id) = id.parse::<ValueId>() else {
            return "Invalid args\n".to_owned();
        };
        match self.explorer.optimize_function(id, level) {
            Ok(new_id) => self.printed(new_id),
            Err(e) => format!("Optimize function failed for id: {id} (error: {})\n", e.error),
        }
    }

    fn delete_command(&mut self, args: &[&str]) -> String {
        let [_, id] = args else {
            return "Usage: df! <function_id> - Delete function\n".to_owned();
        };
        let Ok(id) = id.parse::<ValueId>() else {
            return "Invalid args\n".to_owned();
        };
        match self.explorer.delete_function(id) {
            Ok(()) => format!("Deleted function with id: {id}\n"),
            Err(e) => format!("Delete function failed for id: {id} (error: {})\n", e.error),
        }
    }

    fn decompile_command(&mut self, args: &[&str]) -> String {
        let [_, id] = args else {
            return "Usage: dec <id> - Decompile function with id\n".to_owned();
        };
        let Ok(id) = id.parse::<ValueId>() else {
            return "Invalid args\n".to_owned();
        };
        let result = match self.explorer.decompile_function(id, &mut self.decompiler) {
            Ok(result) => result,
            Err(e) => {
                return format!("Decompile function failed for id: {id} (error: {})\n", e.error);
            }
        };
        match serde_json::to_string_pretty(&result) {
            Ok(json) => json + "\n",
            Err(e) => format!("Decompile function failed for id: {id} (error: {e})\n"),
        }
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new(ExplorerConfig::default())
    }
}

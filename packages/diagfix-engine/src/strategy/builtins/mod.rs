//! Built-in strategies

mod implicit_any;
mod missing_import;
mod missing_property;
mod missing_type;
mod null_safety;
mod type_coercion;
mod unused_symbol;

pub use implicit_any::ImplicitAny;
pub use missing_import::MissingImport;
pub use missing_property::MissingProperty;
pub use missing_type::MissingType;
pub use null_safety::NullSafety;
pub use type_coercion::TypeCoercion;
pub use unused_symbol::UnusedSymbol;

#[cfg(test)]
pub(crate) mod test_support {
    use std::path::Path;

    use diagfix_storage::{Diagnostic, Fix};

    use crate::strategy::FixContext;
    use crate::symbols::SymbolIndex;

    /// Apply a fix's edits to `source` (descending offset order)
    pub fn apply(source: &str, fix: &Fix) -> String {
        let mut edits: Vec<_> = fix.edits.iter().collect();
        edits.sort_by(|a, b| b.start_offset.cmp(&a.start_offset));
        let mut out = source.to_string();
        for edit in edits {
            out.replace_range(edit.start_offset..edit.end_offset, &edit.new_text);
        }
        out
    }

    pub fn context<'a>(d: &'a Diagnostic, source: &'a str, symbols: &'a SymbolIndex) -> FixContext<'a> {
        FixContext::new(d, source, symbols, Path::new(""))
    }
}

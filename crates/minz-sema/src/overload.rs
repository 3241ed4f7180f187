//! Overload resolution (spec §4.3).

use minz_diagnostics::{CandidateDesc, Diagnostic, Position};
use minz_types::{assignable, Assignability, Type};

use crate::symbol::{FunctionSymbol, OverloadSet};
use std::rc::Rc;

fn signature_desc(f: &FunctionSymbol) -> String {
    let params: Vec<String> = f.params.iter().map(|p| p.to_string()).collect();
    format!("({}) -> {}", params.join(", "), f.ret)
}

fn candidate_desc(f: &FunctionSymbol) -> CandidateDesc {
    CandidateDesc { mangled_name: f.mangled_name.clone(), signature: signature_desc(f) }
}

/// Resolve a call `f(a1,…,an)` against an [`OverloadSet`], given the
/// already-typed argument list. Deterministic: the same call against
/// the same set always selects the same candidate (§8.1).
pub fn resolve(set: &OverloadSet, arg_types: &[Type], pos: Position) -> Result<Rc<FunctionSymbol>, Diagnostic> {
    // Step 1: filter by arity.
    let arity_matches: Vec<&Rc<FunctionSymbol>> =
        set.members.iter().filter(|f| f.params.len() == arg_types.len()).collect();

    if arity_matches.is_empty() {
        // Arity mismatch against every candidate: report against the
        // first candidate, matching a single-overload WrongArity call.
        if let Some(first) = set.members.first() {
            return Err(Diagnostic::WrongArity { expected: first.params.len(), actual: arg_types.len(), pos });
        }
        return Err(Diagnostic::NoMatchingOverload { name: set.name.clone(), pos, candidates: vec![] });
    }

    // Step 2: filter by per-argument assignability; track whether any
    // widening was required, to break ties in step 3.
    let mut matches: Vec<(&Rc<FunctionSymbol>, bool)> = Vec::new();
    for f in &arity_matches {
        let mut ok = true;
        let mut needed_widening = false;
        for (param_ty, arg_ty) in f.params.iter().zip(arg_types.iter()) {
            match assignable(arg_ty, param_ty) {
                Assignability::Exact => {}
                Assignability::Widening => needed_widening = true,
                Assignability::No => {
                    ok = false;
                    break;
                }
            }
        }
        if ok {
            matches.push((f, needed_widening));
        }
    }

    match matches.len() {
        0 => Err(Diagnostic::NoMatchingOverload {
            name: set.name.clone(),
            pos,
            candidates: set.members.iter().map(|f| candidate_desc(f)).collect(),
        }),
        1 => Ok(matches[0].0.clone()),
        _ => {
            // Step 3: prefer candidates requiring no widening.
            let exact: Vec<&Rc<FunctionSymbol>> =
                matches.iter().filter(|(_, widened)| !widened).map(|(f, _)| *f).collect();
            match exact.len() {
                1 => Ok(exact[0].clone()),
                0 => Err(Diagnostic::AmbiguousOverload {
                    name: set.name.clone(),
                    pos,
                    candidates: matches.iter().map(|(f, _)| candidate_desc(f)).collect(),
                }),
                _ => Err(Diagnostic::AmbiguousOverload {
                    name: set.name.clone(),
                    pos,
                    candidates: exact.iter().map(|f| candidate_desc(f)).collect(),
                }),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn f(name: &str, params: Vec<Type>) -> Rc<FunctionSymbol> {
        Rc::new(FunctionSymbol { name: name.into(), params, ret: Type::Void, mangled_name: format!("{name}$mangled"), is_pub: false, is_interrupt: false })
    }

    #[test]
    fn scenario_a_exact_match_selects_matching_width() {
        let set = OverloadSet { name: "print".into(), members: vec![f("print", vec![Type::U8]), f("print", vec![Type::U16])] };
        let chosen = resolve(&set, &[Type::U8], Position::synthetic()).unwrap();
        assert_eq!(chosen.params, vec![Type::U8]);
        let chosen = resolve(&set, &[Type::U16], Position::synthetic()).unwrap();
        assert_eq!(chosen.params, vec![Type::U16]);
    }

    #[test]
    fn prefers_no_widening_over_widening() {
        let set = OverloadSet { name: "f".into(), members: vec![f("f", vec![Type::U8]), f("f", vec![Type::U16])] };
        let chosen = resolve(&set, &[Type::U8], Position::synthetic()).unwrap();
        assert_eq!(chosen.params, vec![Type::U8]);
    }

    #[test]
    fn scenario_f_ambiguous_overload() {
        let set = OverloadSet {
            name: "f".into(),
            members: vec![f("f", vec![Type::U8, Type::U16]), f("f", vec![Type::U16, Type::U8])],
        };
        let err = resolve(&set, &[Type::U8, Type::U8], Position::synthetic()).unwrap_err();
        assert_eq!(err.kind_str(), "AmbiguousOverload");
    }

    #[test]
    fn no_matching_overload_reports_all_candidates() {
        let set = OverloadSet { name: "f".into(), members: vec![f("f", vec![Type::U8])] };
        let err = resolve(&set, &[Type::Bool], Position::synthetic()).unwrap_err();
        assert_eq!(err.kind_str(), "NoMatchingOverload");
    }

    #[test]
    fn resolution_is_deterministic() {
        let set = OverloadSet { name: "f".into(), members: vec![f("f", vec![Type::U8]), f("f", vec![Type::U16])] };
        let a = resolve(&set, &[Type::U8], Position::synthetic()).unwrap();
        let b = resolve(&set, &[Type::U8], Position::synthetic()).unwrap();
        assert_eq!(a.mangled_name, b.mangled_name);
    }
}

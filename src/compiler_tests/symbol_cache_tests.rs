//! Tests that the warmed lookup caches agree with linear registry search

use super::{int_function, lower_program, main_module, module, program, return_int, use_module};
use crate::compiler::ast::{EnumMember, Expression, FieldDef, Statement, TypeExpr};
use crate::compiler::codegen::symbols::find_symbol_in_module;

fn sample_program() -> crate::compiler::ast::Program {
    program(vec![
        module(
            "shapes",
            vec![
                Statement::Struct {
                    name: "Rect".to_string(),
                    public: true,
                    fields: vec![
                        FieldDef {
                            name: "width".to_string(),
                            ty: TypeExpr::Int,
                            public: true,
                        },
                        FieldDef {
                            name: "height".to_string(),
                            ty: TypeExpr::Int,
                            public: true,
                        },
                    ],
                },
                Statement::Enum {
                    name: "Kind".to_string(),
                    public: true,
                    members: vec![
                        EnumMember {
                            name: "Square".to_string(),
                            value: None,
                        },
                        EnumMember {
                            name: "Oblong".to_string(),
                            value: Some(7),
                        },
                    ],
                },
                int_function("area", &["w", "h"], vec![return_int(0)]),
            ],
        ),
        main_module(
            Expression::IntLiteral(0),
            vec![use_module("shapes")],
        ),
    ])
}

#[test]
fn every_symbol_cache_entry_matches_linear_search() {
    let session = lower_program(&sample_program()).expect("program should lower");

    for (unit_idx, unit) in session.registry.units().iter().enumerate() {
        for symbol in &unit.symbols {
            let cached = session
                .caches
                .symbols
                .get(&(unit.name, symbol.name))
                .copied();
            let linear = find_symbol_in_module(&session.registry, unit_idx, symbol.name);

            assert_eq!(
                cached, linear,
                "cache and linear search disagree for '{}' in '{}'",
                symbol.name.resolve(&session.interner),
                unit.name.resolve(&session.interner)
            );
        }
    }
}

#[test]
fn every_struct_cache_entry_matches_the_struct_list() {
    let session = lower_program(&sample_program()).expect("program should lower");

    for (idx, info) in session.structs.iter().enumerate() {
        assert_eq!(
            session.caches.structs.get(&info.name).copied(),
            Some(idx),
            "struct cache should point at the registration list entry"
        );
    }
}

#[test]
fn field_reverse_index_names_a_struct_containing_the_field() {
    let session = lower_program(&sample_program()).expect("program should lower");

    for (&field_name, &struct_idx) in &session.caches.field_to_struct {
        let info = &session.structs[struct_idx];
        assert!(
            info.field(field_name).is_some(),
            "field '{}' reverse index points at struct '{}' which lacks it",
            field_name.resolve(&session.interner),
            info.name.resolve(&session.interner)
        );
    }
}

#[test]
fn enum_members_fold_to_their_declared_values() {
    let session = lower_program(&sample_program()).expect("program should lower");

    let shapes = session.interner.get("shapes").unwrap();
    let unit = session.registry.find_unit(shapes).unwrap();

    let square = session.interner.get("Kind.Square").unwrap();
    let oblong = session.interner.get("Kind.Oblong").unwrap();

    let get_value = |name| {
        let idx = unit.find_symbol(name).expect("enum member symbol exists");
        match unit.symbols[idx].kind {
            crate::compiler::codegen::symbols::SymbolKind::EnumConstant { value } => value,
            _ => panic!("enum member should be a constant"),
        }
    };

    assert_eq!(get_value(square), 0, "members count up from zero");
    assert_eq!(get_value(oblong), 7, "explicit discriminants are honoured");
}

#[test]
fn struct_layout_orders_fields_as_declared() {
    let session = lower_program(&sample_program()).expect("program should lower");

    let rect = &session.structs[0];
    assert_eq!(rect.fields.len(), 2);
    assert_eq!(rect.fields[0].offset, 0, "first field sits at offset zero");
    assert_eq!(rect.fields[1].offset, 8, "second Int field follows at 8");
    assert_eq!(rect.size, 16);
    assert_eq!(rect.align, 8);
}

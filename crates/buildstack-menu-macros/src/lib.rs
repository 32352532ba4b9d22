use proc_macro::TokenStream;

use quote::{format_ident, quote};
use syn::{
    Attribute, Expr, ExprArray, ExprLit, ExprPath, ItemStruct, Lit, Meta, Token, parse::Parser,
    spanned::Spanned,
};

/// Declares a unit extension.
///
/// ```ignore
/// #[Extension(id = "otbr", hooks = [options, pre_build, run_checks])]
/// pub struct OtbrExtension { .. }
/// ```
///
/// Generates `UNIT_ID`/`HOOKS` constants and the `HookTable` impl the
/// discovery probe reads. Hook bodies are provided by a hand-written
/// `UnitExtension` impl.
#[proc_macro_attribute]
#[allow(non_snake_case)]
pub fn Extension(attr: TokenStream, item: TokenStream) -> TokenStream {
    match extension_impl(attr, item) {
        Ok(ts) => ts,
        Err(e) => e.to_compile_error().into(),
    }
}

fn lit_str(expr: &Expr) -> syn::Result<String> {
    match expr {
        Expr::Lit(ExprLit {
            lit: Lit::Str(s), ..
        }) => Ok(s.value()),
        _ => Err(syn::Error::new(expr.span(), "expected string literal")),
    }
}

fn expr_array_idents(expr: &Expr) -> syn::Result<Vec<syn::Ident>> {
    let Expr::Array(ExprArray { elems, .. }) = expr else {
        return Err(syn::Error::new(expr.span(), "expected array literal"));
    };
    let mut out = Vec::new();
    for e in elems {
        match e {
            Expr::Path(ExprPath { path, .. }) => match path.get_ident() {
                Some(ident) => out.push(ident.clone()),
                None => return Err(syn::Error::new(e.span(), "expected bare hook name")),
            },
            _ => return Err(syn::Error::new(e.span(), "expected hook name (identifier)")),
        }
    }
    Ok(out)
}

fn hook_variant(ident: &syn::Ident) -> syn::Result<syn::Ident> {
    let variant = match ident.to_string().as_str() {
        "options" => "Options",
        "pre_build" => "PreBuild",
        "post_build" => "PostBuild",
        "run_checks" => "RunChecks",
        other => {
            return Err(syn::Error::new(
                ident.span(),
                format!(
                    "unknown hook '{other}' (expected options, pre_build, post_build, run_checks)"
                ),
            ));
        }
    };
    Ok(format_ident!("{}", variant))
}

fn drop_our_attrs(attrs: &[Attribute]) -> Vec<Attribute> {
    attrs
        .iter()
        .filter(|a| {
            let Meta::Path(p) = &a.meta else {
                return true;
            };
            p.get_ident().map(|i| i != "Extension").unwrap_or(true)
        })
        .cloned()
        .collect()
}

fn extension_impl(attr: TokenStream, item: TokenStream) -> syn::Result<TokenStream> {
    let mut st: ItemStruct = syn::parse(item)?;
    st.attrs = drop_our_attrs(&st.attrs);
    let struct_ident = st.ident.clone();
    let (impl_generics, ty_generics, where_clause) = st.generics.split_for_impl();

    let parser = syn::punctuated::Punctuated::<Meta, Token![,]>::parse_terminated;
    let metas = parser.parse(attr)?;

    let mut id: Option<String> = None;
    let mut hooks: Vec<syn::Ident> = Vec::new();

    for m in metas {
        let Meta::NameValue(nv) = m else {
            return Err(syn::Error::new(m.span(), "expected key = value"));
        };
        let Some(key) = nv.path.get_ident().map(|i| i.to_string()) else {
            return Err(syn::Error::new(nv.path.span(), "expected ident key"));
        };
        let v = &nv.value;
        match key.as_str() {
            "id" => id = Some(lit_str(v)?),
            "hooks" => hooks = expr_array_idents(v)?,
            other => {
                return Err(syn::Error::new(
                    nv.path.span(),
                    format!("unknown Extension attribute key '{other}'"),
                ));
            }
        }
    }

    let id = id.ok_or_else(|| syn::Error::new(struct_ident.span(), "Extension: missing id"))?;
    if id.trim().is_empty() {
        return Err(syn::Error::new(struct_ident.span(), "Extension: empty id"));
    }

    let mut variants: Vec<syn::Ident> = Vec::with_capacity(hooks.len());
    for h in &hooks {
        let v = hook_variant(h)?;
        if variants.contains(&v) {
            return Err(syn::Error::new(
                h.span(),
                format!("hook '{h}' listed more than once"),
            ));
        }
        variants.push(v);
    }

    let expanded = quote! {
        #st

        impl #impl_generics #struct_ident #ty_generics #where_clause {
            pub const UNIT_ID: &'static str = #id;
            pub const HOOKS: &'static [crate::extensions::HookKind] =
                &[#(crate::extensions::HookKind::#variants),*];
        }

        impl #impl_generics crate::extensions::HookTable for #struct_ident #ty_generics #where_clause {
            fn unit_id(&self) -> &str {
                Self::UNIT_ID
            }

            fn declared_hooks(&self) -> &[crate::extensions::HookKind] {
                Self::HOOKS
            }
        }
    };

    Ok(expanded.into())
}

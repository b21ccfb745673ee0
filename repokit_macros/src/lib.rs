//! Procedural macros for the `repokit` ORM core.
//!
//! - `#[derive(Entity)]`: turns a struct's fields into a static schema description plus a
//!   getter/setter pair keyed by property name.
//! - `#[repository]`: turns a trait into a repository contract, generating a proxy type whose
//!   methods call the shared dispatcher.

use proc_macro::TokenStream;
use proc_macro2::{Span, TokenStream as TokenStream2};
use quote::{format_ident, quote, ToTokens};
use syn::{
    parse::{Parse, ParseStream},
    parse_macro_input,
    punctuated::Punctuated,
    spanned::Spanned,
    Data, DeriveInput, Fields, FnArg, GenericArgument, Ident, ItemTrait, LitStr, Pat,
    PathArguments, ReturnType, Token, TraitItem, TraitItemFn, Type, TypeParamBound,
};

// --- Helpers ---

/// A helper struct for parsing `key = "value"` style meta attributes.
struct MetaNameValue {
    pub path: syn::Path,
    pub _eq_token: Token![=],
    pub value: LitStr,
}

impl Parse for MetaNameValue {
    fn parse(input: ParseStream) -> syn::Result<Self> {
        Ok(Self {
            path: input.parse()?,
            _eq_token: input.parse()?,
            value: input.parse()?,
        })
    }
}

/// The single generic argument of `Wrapper<T>` when the last path segment is `wrapper`.
fn generic_inner<'a>(ty: &'a Type, wrapper: &str) -> Option<&'a Type> {
    if let Type::Path(type_path) = ty {
        if type_path.qself.is_some() {
            return None;
        }
        let segment = type_path.path.segments.last()?;
        if segment.ident != wrapper {
            return None;
        }
        if let PathArguments::AngleBracketed(args) = &segment.arguments {
            if let Some(GenericArgument::Type(inner)) = args.args.first() {
                return Some(inner);
            }
        }
    }
    None
}

/// Helper to get the inner type of an `Option<T>`.
fn get_option_inner(ty: &Type) -> Option<&Type> {
    generic_inner(ty, "Option")
}

// --- `Entity` derive macro ---

/// Name used to look up a field's storage type: the last path segment for plain paths
/// (`std::string::String` is `String`), the full token text otherwise.
fn type_key(ty: &Type) -> String {
    if let Type::Path(tp) = ty {
        if let Some(last) = tp.path.segments.last() {
            if tp.qself.is_none() && last.arguments.is_empty() {
                return last.ident.to_string();
            }
        }
    }
    ty.to_token_stream().to_string().replace(' ', "")
}

/// Holds parsed metadata about a single struct field.
struct FieldMetadata {
    ident: Ident,
    ty_str: String,
    column: Option<String>,
    nullable: bool,
    is_id: bool,
    is_generated: bool,
    is_skipped: bool,
}

impl FieldMetadata {
    /// `::repokit::StorageType` for the field's (non-optional) type.
    fn storage_type(&self) -> TokenStream2 {
        match self.ty_str.as_str() {
            "i32" => quote! { ::repokit::StorageType::I32 },
            "i64" => quote! { ::repokit::StorageType::I64 },
            "String" => quote! { ::repokit::StorageType::Text },
            "f64" => quote! { ::repokit::StorageType::F64 },
            "bool" => quote! { ::repokit::StorageType::Bool },
            other => quote! { ::repokit::StorageType::Unsupported(#other) },
        }
    }

    fn is_supported(&self) -> bool {
        matches!(
            self.ty_str.as_str(),
            "i32" | "i64" | "String" | "f64" | "bool"
        )
    }
}

fn parse_field_metadata(input: &DeriveInput) -> syn::Result<Vec<FieldMetadata>> {
    let fields = match &input.data {
        Data::Struct(s) => match &s.fields {
            Fields::Named(named) => named,
            _ => {
                return Err(syn::Error::new(
                    input.span(),
                    "#[derive(Entity)] only supports structs with named fields",
                ))
            }
        },
        _ => {
            return Err(syn::Error::new(
                input.span(),
                "#[derive(Entity)] can only be used on structs",
            ))
        }
    };

    let mut out = Vec::with_capacity(fields.named.len());
    for field in &fields.named {
        let Some(ident) = field.ident.clone() else {
            continue;
        };
        let (nullable, inner) = match get_option_inner(&field.ty) {
            Some(inner) => (true, inner),
            None => (false, &field.ty),
        };
        let ty_str = type_key(inner);
        let mut meta = FieldMetadata {
            ident,
            ty_str,
            column: None,
            nullable,
            is_id: false,
            is_generated: false,
            is_skipped: false,
        };
        for attr in &field.attrs {
            if !attr.path().is_ident("property") {
                continue;
            }
            attr.parse_nested_meta(|nested| {
                if nested.path.is_ident("column") {
                    let s: LitStr = nested.value()?.parse()?;
                    meta.column = Some(s.value());
                } else if nested.path.is_ident("id") {
                    meta.is_id = true;
                } else if nested.path.is_ident("generated") {
                    meta.is_generated = true;
                } else if nested.path.is_ident("skip") {
                    meta.is_skipped = true;
                } else {
                    return Err(nested.error("expected `id`, `generated`, `skip` or `column = \"...\"`"));
                }
                Ok(())
            })?;
        }
        out.push(meta);
    }
    Ok(out)
}

fn table_override(input: &DeriveInput) -> syn::Result<Option<String>> {
    for attr in &input.attrs {
        if attr.path().is_ident("entity") {
            let list = attr.meta.require_list()?;
            let MetaNameValue { path, value, .. } = syn::parse2(list.tokens.clone())?;
            if !path.is_ident("table") {
                return Err(syn::Error::new(path.span(), "expected `table = \"...\"`"));
            }
            return Ok(Some(value.value()));
        }
    }
    Ok(None)
}

#[proc_macro_derive(Entity, attributes(entity, property))]
pub fn derive_entity(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match expand_entity(&input) {
        Ok(ts) => ts.into(),
        Err(e) => e.to_compile_error().into(),
    }
}

fn expand_entity(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let struct_name = &input.ident;
    let type_name = struct_name.to_string();
    let fields = parse_field_metadata(input)?;
    let persistent: Vec<&FieldMetadata> = fields.iter().filter(|f| !f.is_skipped).collect();

    let table = table_override(input)?.map(|t| quote! { .table(#t) });

    let properties = persistent.iter().map(|f| {
        let name = f.ident.to_string();
        let storage = f.storage_type();
        let column = f.column.as_ref().map(|c| quote! { .column(#c) });
        let nullable = f.nullable.then(|| quote! { .nullable() });
        let id = f.is_id.then(|| quote! { .id() });
        let generated = f.is_generated.then(|| quote! { .generated() });
        quote! {
            .property(
                ::repokit::PropertyDescriptor::new(#name, #storage)
                    #column #nullable #id #generated
            )
        }
    });

    // Fields of unsupported types never reach a query: resolution rejects the entity first.
    let supported: Vec<&&FieldMetadata> = persistent.iter().filter(|f| f.is_supported()).collect();
    let getters = supported.iter().map(|f| {
        let ident = &f.ident;
        let name = ident.to_string();
        quote! { #name => ::core::option::Option::Some(::repokit::ToParam::to_param(&self.#ident)) }
    });
    let setters = supported.iter().map(|f| {
        let ident = &f.ident;
        let name = ident.to_string();
        quote! { #name => self.#ident = ::repokit::FromParam::from_param(value)? }
    });

    Ok(quote! {
        impl ::repokit::Entity for #struct_name {
            fn descriptor() -> ::repokit::EntityDescriptor {
                ::repokit::EntityDescriptor::new(#type_name)
                    #table
                    #(#properties)*
            }

            fn get_property(&self, name: &str) -> ::core::option::Option<::repokit::ParamValue> {
                match name {
                    #(#getters,)*
                    _ => ::core::option::Option::None,
                }
            }

            #[allow(unused_variables, unreachable_code)]
            fn set_property(
                &mut self,
                name: &str,
                value: ::repokit::ParamValue,
            ) -> ::core::result::Result<(), ::repokit::PropertyError> {
                match name {
                    #(#setters,)*
                    other => {
                        return ::core::result::Result::Err(
                            ::repokit::PropertyError::Unknown(other.to_string()),
                        )
                    }
                }
                ::core::result::Result::Ok(())
            }
        }
    })
}

// --- `repository` attribute macro ---

/// Optional `#[repository(entity = T, key = K)]` arguments.
#[derive(Default)]
struct RepositoryArgs {
    entity: Option<Type>,
    key: Option<Type>,
}

impl Parse for RepositoryArgs {
    fn parse(input: ParseStream) -> syn::Result<Self> {
        let mut args = RepositoryArgs::default();
        let pairs = Punctuated::<syn::MetaNameValue, Token![,]>::parse_terminated(input)?;
        for nv in pairs {
            let syn::Expr::Path(expr_path) = &nv.value else {
                return Err(syn::Error::new(nv.value.span(), "expected a type"));
            };
            let ty = Type::Path(syn::TypePath {
                qself: None,
                path: expr_path.path.clone(),
            });
            if nv.path.is_ident("entity") {
                args.entity = Some(ty);
            } else if nv.path.is_ident("key") {
                args.key = Some(ty);
            } else {
                return Err(syn::Error::new(
                    nv.path.span(),
                    "unknown argument, expected `entity` or `key`",
                ));
            }
        }
        Ok(args)
    }
}

/// `(Entity, Key)` from a `Repository<Entity, Key>` supertrait.
fn entity_from_supertraits(item: &ItemTrait) -> Option<(Type, Type)> {
    item.supertraits.iter().find_map(|bound| {
        let TypeParamBound::Trait(t) = bound else {
            return None;
        };
        let segment = t.path.segments.last()?;
        if segment.ident != "Repository" {
            return None;
        }
        let PathArguments::AngleBracketed(args) = &segment.arguments else {
            return None;
        };
        let mut types = args.args.iter().filter_map(|a| match a {
            GenericArgument::Type(ty) => Some(ty.clone()),
            _ => None,
        });
        Some((types.next()?, types.next()?))
    })
}

/// How a contract method's result is produced, chosen by its declared return type.
enum Returns {
    Many,
    Optional,
    Entity,
}

fn classify_return(sig: &syn::Signature) -> syn::Result<Returns> {
    let ReturnType::Type(_, ty) = &sig.output else {
        return Err(syn::Error::new(
            sig.span(),
            "repository methods must return RepoResult<Vec<E>>, RepoResult<Option<E>> or RepoResult<E>",
        ));
    };
    let ok = generic_inner(ty, "RepoResult")
        .or_else(|| generic_inner(ty, "Result"))
        .ok_or_else(|| syn::Error::new(ty.span(), "expected RepoResult<...>"))?;
    Ok(if generic_inner(ok, "Vec").is_some() {
        Returns::Many
    } else if generic_inner(ok, "Option").is_some() {
        Returns::Optional
    } else {
        Returns::Entity
    })
}

/// Explicit query from `#[query("...")]`, removing the attribute from the method.
fn take_query(method: &mut TraitItemFn) -> syn::Result<Option<LitStr>> {
    let mut query = None;
    let mut error = None;
    method.attrs.retain(|attr| {
        if !attr.path().is_ident("query") {
            return true;
        }
        match attr.parse_args::<LitStr>() {
            Ok(lit) => query = Some(lit),
            Err(e) => error = Some(e),
        }
        false
    });
    match error {
        Some(e) => Err(e),
        None => Ok(query),
    }
}

struct ContractMethod {
    descriptor: TokenStream2,
    body: TokenStream2,
}

fn expand_method(method: &mut TraitItemFn) -> syn::Result<Option<ContractMethod>> {
    let query = take_query(method)?;
    // Methods with a default body are the contract author's own code.
    if method.default.is_some() {
        return Ok(None);
    }
    let sig = &method.sig;
    let name = sig.ident.to_string();
    let mut inputs = sig.inputs.iter();
    match inputs.next() {
        Some(FnArg::Receiver(r)) if r.reference.is_some() && r.mutability.is_none() => {}
        _ => {
            return Err(syn::Error::new(
                sig.span(),
                "repository methods take `&self` followed by the transaction handle",
            ))
        }
    }
    let mut idents = Vec::new();
    for arg in inputs {
        let FnArg::Typed(pat_type) = arg else {
            return Err(syn::Error::new(arg.span(), "unexpected receiver"));
        };
        let Pat::Ident(pat) = pat_type.pat.as_ref() else {
            return Err(syn::Error::new(
                pat_type.pat.span(),
                "repository method arguments must be plain identifiers",
            ));
        };
        idents.push(pat.ident.clone());
    }
    let Some((tx, args)) = idents.split_first() else {
        return Err(syn::Error::new(
            sig.span(),
            "repository methods take the transaction handle as their first argument",
        ));
    };
    let arity = args.len();
    let descriptor = match &query {
        Some(q) => quote! { ::repokit::MethodDescriptor::with_query(#name, #q, #arity) },
        None => quote! { ::repokit::MethodDescriptor::new(#name, #arity) },
    };

    let call = match classify_return(sig)? {
        Returns::Many => quote! {
            self.dispatcher.fetch(#tx, #name, vec![#(::repokit::ToParam::to_param(&#args)),*]).await
        },
        Returns::Optional => quote! {
            self.dispatcher.fetch_optional(#tx, #name, vec![#(::repokit::ToParam::to_param(&#args)),*]).await
        },
        Returns::Entity => {
            let [entity] = args else {
                return Err(syn::Error::new(
                    sig.span(),
                    "a method returning the entity itself must take exactly one entity argument",
                ));
            };
            quote! { self.dispatcher.save(#tx, #name, #entity).await }
        }
    };
    let sig = &method.sig;
    Ok(Some(ContractMethod {
        descriptor,
        body: quote! {
            #sig {
                #call
            }
        },
    }))
}

#[proc_macro_attribute]
pub fn repository(attr: TokenStream, item: TokenStream) -> TokenStream {
    let args = parse_macro_input!(attr as RepositoryArgs);
    let item = parse_macro_input!(item as ItemTrait);
    match expand_repository(args, item) {
        Ok(ts) => ts.into(),
        Err(e) => e.to_compile_error().into(),
    }
}

fn expand_repository(args: RepositoryArgs, mut item: ItemTrait) -> syn::Result<TokenStream2> {
    if !item.generics.params.is_empty() {
        return Err(syn::Error::new(
            item.generics.span(),
            "repository contracts cannot be generic",
        ));
    }
    let (entity_ty, key_ty) = match (args.entity, args.key, entity_from_supertraits(&item)) {
        (Some(e), Some(k), _) => (e, k),
        (None, None, Some(found)) => found,
        (Some(_), None, _) | (None, Some(_), _) => {
            return Err(syn::Error::new(
                Span::call_site(),
                "`entity` and `key` must be given together",
            ))
        }
        (None, None, None) => {
            return Err(syn::Error::new(
                item.ident.span(),
                "cannot determine the entity type: add a `Repository<Entity, Key>` supertrait or `#[repository(entity = T, key = K)]`",
            ))
        }
    };

    let mut methods = Vec::new();
    for trait_item in item.items.iter_mut() {
        if let TraitItem::Fn(method) = trait_item {
            if let Some(m) = expand_method(method)? {
                methods.push(m);
            }
        }
    }
    let descriptors = methods.iter().map(|m| &m.descriptor);
    let bodies = methods.iter().map(|m| &m.body);

    let vis = &item.vis;
    let trait_name = &item.ident;
    let contract_name = trait_name.to_string();
    let proxy = format_ident!("{}Proxy", trait_name);

    Ok(quote! {
        #[::repokit::async_trait]
        #item

        /// Generated implementation of the repository contract.
        #[derive(Debug)]
        #vis struct #proxy {
            dispatcher: ::repokit::Dispatcher<#entity_ty>,
        }

        impl ::repokit::RepositoryContract for #proxy {
            type Entity = #entity_ty;
            type Key = #key_ty;

            const NAME: &'static str = #contract_name;

            fn methods() -> ::std::vec::Vec<::repokit::MethodDescriptor> {
                ::std::vec![#(#descriptors),*]
            }

            fn from_dispatcher(dispatcher: ::repokit::Dispatcher<#entity_ty>) -> Self {
                Self { dispatcher }
            }

            fn dispatcher(&self) -> &::repokit::Dispatcher<#entity_ty> {
                &self.dispatcher
            }
        }

        #[::repokit::async_trait]
        impl #trait_name for #proxy {
            #(#bodies)*
        }
    })
}

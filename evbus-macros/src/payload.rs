use crate::derive_utils::{apply_derives, payload_derives};
use proc_macro::TokenStream;
use quote::quote;
use syn::punctuated::Punctuated;
use syn::spanned::Spanned;
use syn::{Expr, Item, LitStr, Result, Token, parse::Parse, parse::ParseStream, parse_macro_input};

/// 载荷宏的目标：仅支持结构体与枚举
enum PayloadItem {
    Struct(syn::ItemStruct),
    Enum(syn::ItemEnum),
}

impl PayloadItem {
    fn from_item(item: Item, macro_name: &str) -> Result<Self> {
        match item {
            Item::Struct(s) => Ok(Self::Struct(s)),
            Item::Enum(e) => Ok(Self::Enum(e)),
            other => Err(syn::Error::new(
                other.span(),
                format!("#[{macro_name}] can only be used on struct or enum types"),
            )),
        }
    }

    fn ident(&self) -> &syn::Ident {
        match self {
            Self::Struct(s) => &s.ident,
            Self::Enum(e) => &e.ident,
        }
    }

    fn generics(&self) -> &syn::Generics {
        match self {
            Self::Struct(s) => &s.generics,
            Self::Enum(e) => &e.generics,
        }
    }

    fn attrs_mut(&mut self) -> &mut Vec<syn::Attribute> {
        match self {
            Self::Struct(s) => &mut s.attrs,
            Self::Enum(e) => &mut e.attrs,
        }
    }

    fn to_item(&self) -> proc_macro2::TokenStream {
        match self {
            Self::Struct(s) => quote! { #s },
            Self::Enum(e) => quote! { #e },
        }
    }
}

/// #[event_payload] 宏实现
/// - 合并/追加默认派生：Debug, Clone, Serialize, Deserialize
/// - 生成 `::evbus_domain::envelope::EventPayload` 实现
/// - 支持：`#[event_payload(event_type = "...")]`，缺省为类型名
pub(crate) fn expand_event_payload(attr: TokenStream, item: TokenStream) -> TokenStream {
    let cfg = parse_macro_input!(attr as PayloadAttrConfig);
    let item = parse_macro_input!(item as Item);

    let mut target = match PayloadItem::from_item(item, "event_payload") {
        Ok(target) => target,
        Err(err) => return err.to_compile_error().into(),
    };
    if let Some(key) = cfg.reject_unknown(&["event_type"]) {
        return key.to_compile_error().into();
    }

    apply_derives(target.attrs_mut(), payload_derives());

    let event_type = cfg
        .get("event_type")
        .cloned()
        .unwrap_or_else(|| LitStr::new(&target.ident().to_string(), target.ident().span()));

    let item_tokens = target.to_item();
    let payload_impl = event_payload_impl(&target, &event_type);

    TokenStream::from(quote! {
        #item_tokens
        #payload_impl
    })
}

/// #[command] 宏实现
/// - 同 `#[event_payload]` 的派生与 `EventPayload` 实现，事件类型即命令名称
/// - 额外生成 `::evbus_application::command::Command` 实现
/// - 支持：`#[command(name = "...")]`，缺省为类型名
pub(crate) fn expand_command(attr: TokenStream, item: TokenStream) -> TokenStream {
    let cfg = parse_macro_input!(attr as PayloadAttrConfig);
    let item = parse_macro_input!(item as Item);

    let mut target = match PayloadItem::from_item(item, "command") {
        Ok(target) => target,
        Err(err) => return err.to_compile_error().into(),
    };
    if let Some(key) = cfg.reject_unknown(&["name"]) {
        return key.to_compile_error().into();
    }

    apply_derives(target.attrs_mut(), payload_derives());

    let name = cfg
        .get("name")
        .cloned()
        .unwrap_or_else(|| LitStr::new(&target.ident().to_string(), target.ident().span()));

    let ident = target.ident();
    let (impl_generics, ty_generics, where_clause) = target.generics().split_for_impl();
    let item_tokens = target.to_item();
    let payload_impl = event_payload_impl(&target, &name);

    TokenStream::from(quote! {
        #item_tokens
        #payload_impl

        impl #impl_generics ::evbus_application::command::Command for #ident #ty_generics #where_clause {
            const NAME: &'static str = #name;
        }
    })
}

fn event_payload_impl(target: &PayloadItem, event_type: &LitStr) -> proc_macro2::TokenStream {
    let ident = target.ident();
    let (impl_generics, ty_generics, where_clause) = target.generics().split_for_impl();
    quote! {
        impl #impl_generics ::evbus_domain::envelope::EventPayload for #ident #ty_generics #where_clause {
            const EVENT_TYPE: &'static str = #event_type;
        }
    }
}

// -------- parsing --------

/// 形如 `key = "literal", ...` 的宏参数
struct PayloadAttrConfig {
    pairs: Vec<(syn::Ident, LitStr)>,
}

impl PayloadAttrConfig {
    fn get(&self, key: &str) -> Option<&LitStr> {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    fn reject_unknown(&self, allowed: &[&str]) -> Option<syn::Error> {
        self.pairs
            .iter()
            .find(|(k, _)| !allowed.iter().any(|a| k == a))
            .map(|(k, _)| {
                syn::Error::new(
                    k.span(),
                    format!("unknown key; expected {}", allowed.join(" | ")),
                )
            })
    }
}

impl Parse for PayloadAttrConfig {
    fn parse(input: ParseStream) -> Result<Self> {
        let mut pairs: Vec<(syn::Ident, LitStr)> = Vec::new();
        if input.is_empty() {
            return Ok(Self { pairs });
        }

        let assigns: Punctuated<syn::ExprAssign, Token![,]> =
            Punctuated::<syn::ExprAssign, Token![,]>::parse_terminated(input)?;

        for assign in assigns {
            let key = match *assign.left {
                Expr::Path(p) if p.path.segments.len() == 1 => p.path.segments[0].ident.clone(),
                other => return Err(syn::Error::new(other.span(), "invalid attribute key")),
            };
            if pairs.iter().any(|(k, _)| *k == key) {
                return Err(syn::Error::new(
                    key.span(),
                    format!("duplicate key '{key}' in attribute"),
                ));
            }
            let value = match *assign.right {
                Expr::Lit(syn::ExprLit {
                    lit: syn::Lit::Str(lit),
                    ..
                }) => lit,
                other => {
                    return Err(syn::Error::new(
                        other.span(),
                        format!("expected string literal for '{key}'"),
                    ));
                }
            };
            if value.value().trim().is_empty() {
                return Err(syn::Error::new(
                    value.span(),
                    format!("'{key}' must not be blank"),
                ));
            }
            pairs.push((key, value));
        }

        Ok(Self { pairs })
    }
}

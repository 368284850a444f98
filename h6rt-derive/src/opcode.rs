use proc_macro2::TokenStream;
use quote::{format_ident, quote};
use syn::{parse_quote, Data, DeriveInput, Type};

pub fn derive(tokens: proc_macro::TokenStream) -> TokenStream {
	let DeriveInput {
		attrs,
		ident,
		generics,
		data,
		..
	} = syn::parse(tokens).unwrap();

	let data = match data {
		Data::Enum(data) => data,
		Data::Union(_) => panic!("Unions are not supported"),
		Data::Struct(_) => panic!("Structs are not supported"),
	};

	if !generics.params.is_empty() {
		panic!("Generics are not supported");
	}

	let mut repr: Type = parse_quote!(u8);
	for attr in attrs.iter() {
		if attr.path().is_ident("repr") {
			repr = attr.parse_args::<Type>().unwrap();
		}
	}

	let mut from_tag_constants = Vec::with_capacity(data.variants.len());
	let mut from_tag_cases = Vec::with_capacity(data.variants.len());
	let mut tag_cases = Vec::with_capacity(data.variants.len());
	let mut imm_cases = Vec::with_capacity(data.variants.len());

	for (i, variant) in data.variants.iter().enumerate() {
		let Some((_, discriminant)) = &variant.discriminant else {
			panic!("Explicit discriminant required for `{}`", variant.ident);
		};
		let variant_name = &variant.ident;
		let const_ident = format_ident!("DISCRIMINANT_{i}");

		from_tag_constants.push(quote! {
			const #const_ident: #repr = #discriminant;
		});
		from_tag_cases.push(quote! {
			#const_ident => Some(Self::#variant_name),
		});
		tag_cases.push(quote! {
			Self::#variant_name => #discriminant,
		});

		let carries_immediate = variant.attrs.iter().any(|a| a.path().is_ident("imm"));
		if carries_immediate {
			imm_cases.push(quote! {
				Self::#variant_name => true,
			});
		}
	}

	quote! {
		impl #ident {
			/// Recovers an opcode from its raw on-disk tag, or `None` if the tag is unknown.
			pub fn from_tag(tag: #repr) -> Option<Self> {
				#(#from_tag_constants)*
				match tag {
					#(#from_tag_cases)*
					_ => None,
				}
			}

			/// The raw on-disk tag for this opcode.
			pub fn tag(self) -> #repr {
				match self {
					#(#tag_cases)*
				}
			}

			/// Whether the decoder must read a trailing 4-byte immediate after this tag.
			pub fn carries_immediate(self) -> bool {
				match self {
					#(#imm_cases)*
					#[allow(unreachable_patterns)]
					_ => false,
				}
			}
		}
	}
}

//! NFT parameter: a token ID within a collection.

use common::error::Error;

use crate::context::{DeviceKeys, DisplayContext};
use crate::field_table::ExtraData;
use crate::parsing::field::{Field, ParamType};
use crate::parsing::value::Value;
use crate::parsing::FormatEnv;
use crate::tlv::{Multiplicity, TagHandler, TlvParser, TlvRecord};
use crate::utils::format_uint;

const TAG_VERSION: u8 = 0x00;
const TAG_ID: u8 = 0x01;
const TAG_COLLECTION: u8 = 0x02;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NftParam {
    pub version: u8,
    pub id: Value,
    /// Collection address, either one for all IDs or one per ID.
    pub collection: Value,
}

#[derive(Default)]
struct NftBuilder {
    version: u8,
    id: Option<Value>,
    collection: Option<Value>,
}

static NFT_PARSER: TlvParser<NftBuilder> = TlvParser {
    handlers: &[
        TagHandler { tag: TAG_VERSION, handler: handle_version, multiplicity: Multiplicity::EnforceUnique },
        TagHandler { tag: TAG_ID, handler: handle_id, multiplicity: Multiplicity::EnforceUnique },
        TagHandler { tag: TAG_COLLECTION, handler: handle_collection, multiplicity: Multiplicity::EnforceUnique },
    ],
    common: None,
};

fn handle_version(r: &TlvRecord<'_>, b: &mut NftBuilder) -> Result<(), Error> {
    b.version = r.as_u8()?;
    Ok(())
}

fn handle_id(r: &TlvRecord<'_>, b: &mut NftBuilder) -> Result<(), Error> {
    b.id = Some(Value::parse(r.value)?);
    Ok(())
}

fn handle_collection(r: &TlvRecord<'_>, b: &mut NftBuilder) -> Result<(), Error> {
    b.collection = Some(Value::parse(r.value)?);
    Ok(())
}

impl NftParam {
    pub fn parse(payload: &[u8]) -> Result<Self, Error> {
        let mut builder = NftBuilder::default();
        NFT_PARSER.parse(payload, &mut builder)?;
        match (builder.id, builder.collection) {
            (Some(id), Some(collection)) => Ok(Self {
                version: builder.version,
                id,
                collection,
            }),
            _ => Err(Error::MissingField),
        }
    }

    pub fn format<C: DisplayContext + DeviceKeys + ?Sized>(
        &self,
        field: &Field,
        env: &mut FormatEnv<'_, C>,
    ) -> Result<(), Error> {
        let chain_id = env.tx_info()?.chain_id;
        let collections = env.resolve(&self.collection)?;
        let ids = env.resolve(&self.id)?;
        if collections.is_empty() || (collections.len() != 1 && collections.len() != ids.len()) {
            log::warn!(
                "gtp: {} NFT collections for {} IDs",
                collections.len(),
                ids.len()
            );
            return Err(Error::InvalidValue);
        }

        for (i, id) in ids.iter().enumerate() {
            let collection = collections.get(i).or_else(|| collections.get(0)).ok_or(Error::InvalidValue)?;
            let address = collection.to_address();
            let Some(info) = env.registry.nft_info(chain_id, &address) else {
                log::warn!("gtp: unknown NFT collection 0x{}", hex::encode(address));
                return Err(Error::NotFound);
            };
            let text = alloc::format!("{} #{}", info.collection_name, format_uint(id.as_bytes()));
            env.add_field(ParamType::Nft, &field.name, text, Some(ExtraData::Nft(info)))?;
        }
        Ok(())
    }
}

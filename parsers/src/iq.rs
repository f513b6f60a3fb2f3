// Copyright (c) 2017 Emmanuel Gil Peyrot <linkmauve@linkmauve.fr>
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use crate::ns;
use crate::stanza_error::StanzaError;
use jid::Jid;
use minidom::Element;
use xso::error::{Error, FromElementError};

/// Should be implemented on every known payload of an `<iq type='get'/>`.
pub trait IqGetPayload: TryFrom<Element> + Into<Element> {}

/// Should be implemented on every known payload of an `<iq type='set'/>`.
pub trait IqSetPayload: TryFrom<Element> + Into<Element> {}

/// Should be implemented on every known payload of an `<iq type='result'/>`.
pub trait IqResultPayload: TryFrom<Element> + Into<Element> {}

/// The payload of a request, of which we can only have one, and which we
/// don't need to have an exact name for, since it will be translated from/to
/// its type.
#[derive(Debug, Clone, PartialEq)]
pub enum IqType {
    /// The `<iq/>` is a request for information.
    Get(Element),

    /// The `<iq/>` wants to modify some state.
    Set(Element),

    /// The `<iq/>` is a reply to a previous request, and contains no
    /// payload, if the processing was successful.
    Result(Option<Element>),

    /// The `<iq/>` is actually an error from a previous request of any
    /// type, we can currently only receive it but this crate doesn’t
    /// provide a way to create such an error.
    Error(StanzaError),
}

/// The main structure representing the `<iq/>` stanza.
#[derive(Debug, Clone, PartialEq)]
pub struct Iq {
    /// The JID emitting this stanza.
    pub from: Option<Jid>,

    /// The recipient of this stanza.
    pub to: Option<Jid>,

    /// The @id attribute of this stanza, which is required in order to
    /// match a request with its response.
    pub id: String,

    /// The payload content of this stanza.
    pub payload: IqType,
}

impl Iq {
    fn new(id: String, payload: IqType) -> Iq {
        Iq {
            from: None,
            to: None,
            id,
            payload,
        }
    }

    /// Creates an `<iq type='get'/>` with the given payload.
    pub fn from_get<S: Into<String>, P: IqGetPayload>(id: S, payload: P) -> Iq {
        Self::new(id.into(), IqType::Get(payload.into()))
    }

    /// Creates an `<iq type='set'/>` with the given payload.
    pub fn from_set<S: Into<String>, P: IqSetPayload>(id: S, payload: P) -> Iq {
        Self::new(id.into(), IqType::Set(payload.into()))
    }

    /// Creates an `<iq type='result'/>` with no payload.
    pub fn empty_result<S: Into<String>>(id: S) -> Iq {
        Self::new(id.into(), IqType::Result(None))
    }

    /// Creates an `<iq type='result'/>` with the given payload.
    pub fn from_result<S: Into<String>, P: IqResultPayload>(id: S, payload: Option<P>) -> Iq {
        Self::new(id.into(), IqType::Result(payload.map(Into::into)))
    }

    /// Creates an `<iq type='error'/>` with the given error payload.
    pub fn from_error<S: Into<String>>(id: S, payload: StanzaError) -> Iq {
        Self::new(id.into(), IqType::Error(payload))
    }

    /// Sets the recipient of this stanza.
    pub fn with_to(mut self, to: Jid) -> Iq {
        self.to = Some(to);
        self
    }

    /// Sets the sender of this stanza.
    pub fn with_from(mut self, from: Jid) -> Iq {
        self.from = Some(from);
        self
    }

    /// Tries to parse this stanza's payload as the given type, failing if
    /// this `<iq/>` isn't the right type, or if the payload doesn't parse.
    pub fn payload_as<P: TryFrom<Element, Error = FromElementError>>(
        &self,
    ) -> Option<Result<P, Error>> {
        let elem = match &self.payload {
            IqType::Get(elem) | IqType::Set(elem) => elem,
            IqType::Result(Some(elem)) => elem,
            IqType::Result(None) | IqType::Error(_) => return None,
        };
        Some(
            P::try_from(elem.clone()).map_err(|err| match err {
                FromElementError::Mismatch(_) => {
                    Error::Other("Iq payload didn't match the requested type.")
                }
                FromElementError::Invalid(err) => err,
            }),
        )
    }
}

impl TryFrom<Element> for Iq {
    type Error = FromElementError;

    fn try_from(root: Element) -> Result<Iq, FromElementError> {
        check_self!(root, "iq", DEFAULT_NS);
        let from = get_attr!(root, "from", Option);
        let to = get_attr!(root, "to", Option);
        let id = get_attr!(root, "id", Required);
        let type_: String = get_attr!(root, "type", Required);

        let mut payload = None;
        let mut error_payload = None;
        for elem in root.children() {
            if payload.is_some() {
                return Err(Error::Other("Wrong number of children in iq element.").into());
            }
            if elem.is("error", ns::DEFAULT_NS) {
                error_payload = Some(StanzaError::try_from(elem.clone())?);
            } else {
                payload = Some(elem.clone());
            }
        }

        let type_ = match type_.as_str() {
            "get" => IqType::Get(
                payload.ok_or(Error::Other("Wrong number of children in iq element."))?,
            ),
            "set" => IqType::Set(
                payload.ok_or(Error::Other("Wrong number of children in iq element."))?,
            ),
            "result" => IqType::Result(payload),
            "error" => IqType::Error(
                error_payload.ok_or(Error::Other("Error iq must contain an error payload."))?,
            ),
            _ => return Err(Error::Other("Unknown iq type.").into()),
        };

        Ok(Iq {
            from,
            to,
            id,
            payload: type_,
        })
    }
}

impl From<Iq> for Element {
    fn from(iq: Iq) -> Element {
        let type_ = match iq.payload {
            IqType::Get(_) => "get",
            IqType::Set(_) => "set",
            IqType::Result(_) => "result",
            IqType::Error(_) => "error",
        };
        Element::builder("iq", ns::DEFAULT_NS)
            .attr("from", iq.from)
            .attr("to", iq.to)
            .attr("id", iq.id)
            .attr("type", type_)
            .append_all(match iq.payload {
                IqType::Get(elem) | IqType::Set(elem) => Some(elem),
                IqType::Result(elem) => elem,
                IqType::Error(error) => Some(Element::from(error)),
            })
            .build()
    }
}

impl ::xso::FromXml for Iq {
    type Builder = ::xso::minidom_compat::FromEventsViaElement<Iq>;

    fn from_events(
        qname: ::xso::exports::rxml::QName,
        attrs: ::xso::exports::rxml::AttrMap,
    ) -> Result<Self::Builder, ::xso::error::FromEventsError> {
        if qname.0 != crate::ns::DEFAULT_NS || qname.1 != "iq" {
            return Err(::xso::error::FromEventsError::Mismatch { name: qname, attrs });
        }
        Self::Builder::new(qname, attrs)
    }
}

impl ::xso::AsXml for Iq {
    type ItemIter<'x> = ::xso::minidom_compat::AsItemsViaElement<'x>;

    fn as_xml_iter(&self) -> Result<Self::ItemIter<'_>, ::xso::error::Error> {
        ::xso::minidom_compat::AsItemsViaElement::new(self.clone())
    }
}

//! Default-value layouts of the service requests.
use serde_json::{Value, json};

use crate::config::SERVICE_NS;

const LOTE_ID: &str = "000000001";

/// Single-RPS batch. Both the batch envelope and the RPS carry a signature
/// placeholder.
pub(super) fn recepcionar_lote_rps() -> Value {
    let lista_rps = json!([
        {
            "Rps": {
                "InfRps": {
                    "@attributes": { "Id": LOTE_ID },
                    "IdentificacaoRps": {
                        "Numero": LOTE_ID,
                        "Serie": 1,
                        "Tipo": 0
                    },
                    "DataEmissao": null,
                    "NaturezaOperacao": 1,
                    "RegimeEspecialTributacao": 0,
                    "OptanteSimplesNacional": 1,
                    "IncentivadorCultural": 2,
                    "Status": 1,
                    "Servico": {
                        "Valores": {
                            "ValorServicos": 0.00,
                            "ValorDeducoes": 0.00,
                            "ValorPis": 0.00,
                            "ValorCofins": 0.00,
                            "ValorInss": 0.00,
                            "ValorIr": 0.00,
                            "ValorCsll": 0.00,
                            "IssRetido": null,
                            "ValorIss": 0.00,
                            "ValorIssRetido": 0.00,
                            "OutrasRetencoes": 0.00,
                            "BaseCalculo": 0.00,
                            "Aliquota": 0.00,
                            "ValorLiquidoNfse": 0.00,
                            "DescontoIncondicionado": 0.00,
                            "DescontoCondicionado": 0.00
                        },
                        "ItemListaServico": null,
                        "CodigoCnae": null,
                        "Discriminacao": null,
                        "CodigoMunicipio": null
                    },
                    "Prestador": {
                        "Cnpj": null,
                        "InscricaoMunicipal": null
                    },
                    "Tomador": {
                        "RazaoSocial": null,
                        "Endereco": []
                    },
                    "Signature": null
                }
            }
        }
    ]);

    json!({
        "RecepcionarLoteRps": {
            "@attributes": { "xmlns": SERVICE_NS },
            "EnviarLoteRpsEnvio": {
                "LoteRps": {
                    "@attributes": { "Id": LOTE_ID },
                    "NumeroLote": LOTE_ID,
                    "Cnpj": null,
                    "InscricaoMunicipal": null,
                    "QuantidadeRps": 1,
                    "ListaRps": lista_rps
                },
                "Signature": null
            }
        }
    })
}

pub(super) fn consultar_nfse_por_rps() -> Value {
    json!({
        "ConsultarNfsePorRps": {
            "@attributes": { "xmlns": SERVICE_NS },
            "ConsultarNfseRpsEnvio": {
                "IdentificacaoRps": {
                    "Numero": null,
                    "Serie": null,
                    "Tipo": null
                },
                "Prestador": {
                    "Cnpj": null,
                    "InscricaoMunicipal": null
                }
            }
        }
    })
}

// the placeholder keeps an empty Id attribute, so the signature references ""
pub(super) fn cancelar_nfse() -> Value {
    json!({
        "CancelarNfse": {
            "@attributes": { "xmlns": SERVICE_NS },
            "CancelarNfseEnvio": {
                "Pedido": {
                    "InfPedidoCancelamento": {
                        "IdentificacaoNfse": {
                            "Numero": null,
                            "Cnpj": null,
                            "InscricaoMunicipal": null
                        },
                        "CodigoCancelamento": null
                    }
                },
                "Signature": {
                    "@attributes": { "Id": null }
                }
            }
        }
    })
}
